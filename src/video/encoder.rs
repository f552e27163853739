use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Result, VideoError};
use crate::video::decoder::{drain_stderr, join_stderr};
use crate::video::types::FrameSequence;

/// Represents an encoded video output
#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub frame_rate: u32,
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
}

impl EncodedVideo {
    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.frame_rate.max(1) as f64
    }
}

/// Sink that turns a frame sequence into a video-only file
pub trait VideoEncoder: Send {
    /// Encode `sequence` at `target_frame_rate` into `output`
    ///
    /// Implementations must not leave a partially written `output` behind on error.
    fn encode(
        &mut self,
        sequence: &FrameSequence,
        target_frame_rate: u32,
        output: &Path,
    ) -> Result<EncodedVideo>;
}

/// Codec settings for the encoder
#[derive(Debug, Clone)]
pub struct EncodeParams {
    /// FFmpeg codec name (`mpeg4` matches the `mp4v` fourcc)
    pub codec: String,
    pub pixel_format: String,
    /// Quality setting (0-100, higher is better)
    pub quality: u8,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            codec: "mpeg4".to_string(),
            pixel_format: "yuv420p".to_string(),
            quality: 85,
        }
    }
}

impl EncodeParams {
    /// Size of the encoded picture; yuv420p needs even dimensions, so odd ones are padded
    pub fn output_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if self.pixel_format == "yuv420p" {
            (width + width % 2, height + height % 2)
        } else {
            (width, height)
        }
    }

    /// Quality flags for the configured codec
    fn quality_args(&self) -> Vec<String> {
        let quality = self.quality.min(100) as f32 / 100.0;
        match self.codec.as_str() {
            "libx264" | "libx265" | "h264" | "hevc" => {
                let crf = (51.0 - quality * 51.0).round().clamp(0.0, 51.0) as u8;
                vec!["-crf".to_string(), crf.to_string()]
            }
            _ => {
                // mpeg4-style qscale: 1 is best, 31 worst
                let q = (31.0 - quality * 30.0).round().clamp(1.0, 31.0) as u8;
                vec!["-q:v".to_string(), q.to_string()]
            }
        }
    }
}

/// Encoder piping raw rgb24 frames into an external `ffmpeg` process
pub struct FfmpegEncoder {
    ffmpeg: String,
    params: EncodeParams,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: &str, params: EncodeParams) -> Self {
        Self {
            ffmpeg: ffmpeg.to_string(),
            params,
        }
    }

    fn build_command(&self, width: u32, height: u32, fps: u32, output: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &fps.to_string()])
            .args(["-i", "-"])
            .args(["-c:v", &self.params.codec])
            .args(["-pix_fmt", &self.params.pixel_format]);

        if self.params.output_dimensions(width, height) != (width, height) {
            warn!("Padding {}x{} to even dimensions for yuv420p", width, height);
            cmd.args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"]);
        }

        cmd.args(self.params.quality_args())
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(
        &mut self,
        sequence: &FrameSequence,
        target_frame_rate: u32,
        output: &Path,
    ) -> Result<EncodedVideo> {
        sequence.ensure_non_empty()?;
        if target_frame_rate == 0 {
            return Err(VideoError::EncodeFailure {
                reason: "target frame rate must be positive".to_string(),
            }
            .into());
        }
        let (width, height) = sequence.dimensions().unwrap_or((0, 0));

        info!(
            "Encoding {} frames ({}x{} @ {} fps) with {}",
            sequence.len(),
            width,
            height,
            target_frame_rate,
            self.params.codec
        );

        let mut child = self
            .build_command(width, height, target_frame_rate, output)
            .spawn()
            .map_err(|_| VideoError::ToolNotFound {
                tool: self.ffmpeg.clone(),
            })?;
        // Drained concurrently: ffmpeg stalls on a full stderr pipe while we write stdin
        let stderr = drain_stderr(&mut child);

        let write_result = match child.stdin.take() {
            Some(mut stdin) => sequence
                .iter()
                .try_for_each(|frame| stdin.write_all(frame.as_rgb_bytes())),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "ffmpeg stdin unavailable",
            )),
        };

        let status = child.wait().map_err(|e| VideoError::EncodeFailure {
            reason: format!("FFmpeg execution failed: {}", e),
        })?;
        let stderr = join_stderr(stderr);

        if !status.success() || write_result.is_err() {
            let _ = std::fs::remove_file(output);
            let reason = match write_result {
                Err(e) => format!("writing frames failed: {}; {}", e, stderr),
                Ok(()) => format!("FFmpeg failed: {}", stderr),
            };
            return Err(VideoError::EncodeFailure { reason }.into());
        }

        let file_size = std::fs::metadata(output)?.len();
        debug!("Wrote {} ({} bytes)", output.display(), file_size);
        let (width, height) = self.params.output_dimensions(width, height);

        Ok(EncodedVideo {
            path: output.to_path_buf(),
            frame_rate: target_frame_rate,
            frame_count: sequence.len(),
            width,
            height,
            file_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_mapping_for_mpeg4() {
        let params = EncodeParams {
            quality: 100,
            ..EncodeParams::default()
        };
        assert_eq!(params.quality_args(), vec!["-q:v", "1"]);

        let params = EncodeParams {
            quality: 0,
            ..EncodeParams::default()
        };
        assert_eq!(params.quality_args(), vec!["-q:v", "31"]);
    }

    #[test]
    fn test_quality_mapping_for_x264() {
        let params = EncodeParams {
            codec: "libx264".to_string(),
            quality: 100,
            ..EncodeParams::default()
        };
        assert_eq!(params.quality_args(), vec!["-crf", "0"]);
    }

    #[test]
    fn test_odd_dimensions_are_padded_for_yuv420p() {
        let params = EncodeParams::default();
        assert_eq!(params.output_dimensions(63, 47), (64, 48));
        assert_eq!(params.output_dimensions(64, 48), (64, 48));

        let rgb = EncodeParams {
            pixel_format: "rgb24".to_string(),
            ..EncodeParams::default()
        };
        assert_eq!(rgb.output_dimensions(63, 47), (63, 47));
    }

    #[cfg(unix)]
    #[test]
    fn test_noisy_stderr_does_not_stall_encoding() {
        use crate::video::decoder::tests::fake_tool;

        let dir = tempfile::tempdir().unwrap();
        // Chatter first, only then consume stdin and write the last argument
        let tool = fake_tool(
            dir.path(),
            "head -c 300000 /dev/zero | tr '\\0' 'e' >&2\ncat > /dev/null\nfor last; do :; done\nprintf video > \"$last\"",
        );
        let out = dir.path().join("out.mp4");
        let target = out.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let mut encoder = FfmpegEncoder::new(tool.to_str().unwrap(), EncodeParams::default());
            // Two frames larger than a pipe buffer each
            let seq = FrameSequence::solid(2, 30, 161, 160, [9, 9, 9]).unwrap();
            let _ = tx.send(encoder.encode(&seq, 30, &target));
        });

        let encoded = rx
            .recv_timeout(std::time::Duration::from_secs(20))
            .expect("encoder did not finish")
            .unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"video");
        assert_eq!((encoded.width, encoded.height), (162, 160));
        assert_eq!(encoded.frame_count, 2);
    }

    #[test]
    fn test_encode_rejects_empty_sequence() {
        let mut encoder = FfmpegEncoder::new("ffmpeg", EncodeParams::default());
        let empty = FrameSequence::new(Vec::new(), 30).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let result = encoder.encode(&empty, 30, &dir.path().join("out.mp4"));
        assert!(matches!(
            result,
            Err(crate::VidfxError::Video(VideoError::EmptySequence))
        ));
    }

    #[test]
    fn test_missing_ffmpeg_is_reported() {
        let mut encoder = FfmpegEncoder::new("definitely-not-ffmpeg-xyz", EncodeParams::default());
        let seq = FrameSequence::solid(1, 30, 4, 4, [0, 0, 0]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        let result = encoder.encode(&seq, 30, &out);
        assert!(matches!(
            result,
            Err(crate::VidfxError::Video(VideoError::ToolNotFound { .. }))
        ));
        assert!(!out.exists());
    }
}
