//! # Video I/O Module
//!
//! Frame and sequence types plus the decode/encode/audio collaborators that sit
//! at the edge of the transform engine. The FFmpeg-backed implementations shell
//! out to the `ffmpeg`/`ffprobe` executables.

pub mod audio;
pub mod decoder;
pub mod encoder;
pub mod types;

pub use audio::{AudioHandle, AudioMuxer, FfmpegAudioMuxer};
pub use decoder::{tool_available, FfmpegDecoder, FrameStream, MemoryDecoder, VideoDecoder};
pub use encoder::{EncodeParams, EncodedVideo, FfmpegEncoder, VideoEncoder};
pub use types::{is_supported_input, Frame, FrameSequence, VideoMetadata};
