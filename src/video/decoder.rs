use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Result, VideoError};
use crate::video::types::{Frame, FrameSequence, VideoMetadata};

/// Bytes of ffmpeg diagnostics kept for error messages
const STDERR_TAIL: usize = 16 * 1024;

/// Boxed stream of decoded frames, in presentation order
pub type FrameStream<'a> = Box<dyn Iterator<Item = Result<Frame>> + Send + 'a>;

/// Source of decoded frames
///
/// `frames` yields one frame at a time so streaming stages never need the whole
/// clip in memory; `decode` materializes it.
pub trait VideoDecoder: Send {
    /// Stream metadata (rate, count, size)
    fn metadata(&mut self) -> Result<VideoMetadata>;

    /// Sequential access to the decoded frames
    fn frames(&mut self) -> Result<FrameStream<'_>>;

    /// Decode the whole stream into memory
    fn decode(&mut self) -> Result<FrameSequence> {
        let metadata = self.metadata()?;
        let frames = self.frames()?.collect::<Result<Vec<_>>>()?;
        let sequence = FrameSequence::new(frames, metadata.frame_rate)?;
        sequence.ensure_non_empty()?;
        Ok(sequence)
    }
}

/// Decoder serving a sequence that is already in memory
pub struct MemoryDecoder {
    metadata: VideoMetadata,
    sequence: Option<FrameSequence>,
}

impl MemoryDecoder {
    pub fn new(sequence: FrameSequence) -> Self {
        let (width, height) = sequence.dimensions().unwrap_or((0, 0));
        Self {
            metadata: VideoMetadata {
                frame_rate: sequence.frame_rate(),
                frame_count: sequence.len(),
                width,
                height,
                has_audio: false,
            },
            sequence: Some(sequence),
        }
    }

    /// Marks the in-memory source as carrying an audio track
    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.metadata.has_audio = has_audio;
        self
    }

    fn take(&mut self) -> Result<FrameSequence> {
        self.sequence.take().ok_or_else(|| {
            VideoError::DecodeFailure {
                reason: "in-memory source was already consumed".to_string(),
            }
            .into()
        })
    }
}

impl VideoDecoder for MemoryDecoder {
    fn metadata(&mut self) -> Result<VideoMetadata> {
        Ok(self.metadata.clone())
    }

    fn frames(&mut self) -> Result<FrameStream<'_>> {
        let sequence = self.take()?;
        Ok(Box::new(sequence.into_frames().into_iter().map(Ok)))
    }

    fn decode(&mut self) -> Result<FrameSequence> {
        let sequence = self.take()?;
        sequence.ensure_non_empty()?;
        Ok(sequence)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Decoder backed by the external `ffprobe`/`ffmpeg` executables
pub struct FfmpegDecoder {
    path: PathBuf,
    ffmpeg: String,
    ffprobe: String,
    metadata: Option<VideoMetadata>,
}

impl FfmpegDecoder {
    pub fn new<P: Into<PathBuf>>(path: P, ffmpeg: &str, ffprobe: &str) -> Self {
        Self {
            path: path.into(),
            ffmpeg: ffmpeg.to_string(),
            ffprobe: ffprobe.to_string(),
            metadata: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn probe(&self) -> Result<VideoMetadata> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(&self.path)
            .output()
            .map_err(|_| VideoError::ToolNotFound {
                tool: self.ffprobe.clone(),
            })?;

        if !output.status.success() {
            return Err(VideoError::DecodeFailure {
                reason: format!(
                    "ffprobe failed for {}: {}",
                    self.path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }
            .into());
        }

        let probe: ProbeOutput =
            serde_json::from_slice(&output.stdout).map_err(|e| VideoError::DecodeFailure {
                reason: format!("invalid ffprobe output: {}", e),
            })?;

        metadata_from_probe(&probe).ok_or_else(|| {
            VideoError::DecodeFailure {
                reason: format!("no video stream in {}", self.path.display()),
            }
            .into()
        })
    }
}

fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.parse().ok(),
    }
}

fn metadata_from_probe(probe: &ProbeOutput) -> Option<VideoMetadata> {
    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .filter(|r| *r > 0.0)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rate))
        .filter(|r| *r > 0.0)?;

    let frame_count = match video.nb_frames.as_deref().and_then(|n| n.parse::<usize>().ok()) {
        Some(count) => count,
        None => {
            let duration = video
                .duration
                .as_deref()
                .or_else(|| probe.format.as_ref().and_then(|f| f.duration.as_deref()))
                .and_then(|d| d.parse::<f64>().ok())
                .unwrap_or(0.0);
            (duration * fps).round() as usize
        }
    };

    Some(VideoMetadata {
        // Fractional rates are truncated (29.97 -> 29)
        frame_rate: fps.floor().max(1.0) as u32,
        frame_count,
        width: video.width?,
        height: video.height?,
        has_audio,
    })
}

impl VideoDecoder for FfmpegDecoder {
    fn metadata(&mut self) -> Result<VideoMetadata> {
        if let Some(metadata) = &self.metadata {
            return Ok(metadata.clone());
        }
        let metadata = self.probe()?;
        info!(
            "Video metadata: {}x{} @ {} fps, {} frames, audio: {}",
            metadata.width, metadata.height, metadata.frame_rate, metadata.frame_count, metadata.has_audio
        );
        self.metadata = Some(metadata.clone());
        Ok(metadata)
    }

    fn frames(&mut self) -> Result<FrameStream<'_>> {
        let metadata = self.metadata()?;

        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|_| VideoError::ToolNotFound {
                tool: self.ffmpeg.clone(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| VideoError::DecodeFailure {
            reason: "ffmpeg stdout unavailable".to_string(),
        })?;
        let stderr = drain_stderr(&mut child);

        debug!("Streaming rgb24 frames from {}", self.path.display());
        Ok(Box::new(RawFrameReader {
            child,
            stdout,
            stderr,
            width: metadata.width,
            height: metadata.height,
            decoded: 0,
            finished: false,
        }))
    }
}

/// Reads fixed-size rgb24 frames from a running ffmpeg process
struct RawFrameReader {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    decoded: usize,
    finished: bool,
}

impl RawFrameReader {
    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Fill `buf` as far as the pipe allows, returning the number of bytes read
    fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr = join_stderr(self.stderr.take());
        if !status.success() {
            return Err(VideoError::DecodeFailure {
                reason: format!("ffmpeg exited with {}: {}", status, stderr),
            }
            .into());
        }
        debug!("Decoder finished after {} frames", self.decoded);
        Ok(())
    }
}

impl Iterator for RawFrameReader {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut buf = vec![0u8; self.frame_len()];
        let filled = match self.fill(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                self.finished = true;
                return Some(Err(VideoError::DecodeFailure {
                    reason: format!("reading frame {}: {}", self.decoded, e),
                }
                .into()));
            }
        };

        if filled == 0 {
            return self.finish().err().map(Err);
        }
        if filled < buf.len() {
            self.finished = true;
            let _ = self.child.kill();
            let _ = self.child.wait();
            return Some(Err(VideoError::DecodeFailure {
                reason: format!(
                    "truncated frame {}: {} of {} bytes",
                    self.decoded,
                    filled,
                    buf.len()
                ),
            }
            .into()));
        }

        self.decoded += 1;
        Some(
            Frame::from_rgb_bytes(self.width, self.height, buf).ok_or_else(|| {
                VideoError::DecodeFailure {
                    reason: format!("frame {} has an invalid buffer size", self.decoded - 1),
                }
                .into()
            }),
        )
    }
}

impl Drop for RawFrameReader {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Stopping decoder early after {} frames", self.decoded);
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        join_stderr(self.stderr.take());
    }
}

/// Read a child's stderr on a helper thread so a chatty process never blocks on it
///
/// Only the last [`STDERR_TAIL`] bytes are kept.
pub(crate) fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut pipe = child.stderr.take()?;
    let handle = std::thread::Builder::new()
        .name("vidfx-ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut tail = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        tail.extend_from_slice(&chunk[..n]);
                        if tail.len() > STDERR_TAIL {
                            let excess = tail.len() - STDERR_TAIL;
                            tail.drain(..excess);
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            String::from_utf8_lossy(&tail).trim().to_string()
        });
    match handle {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Could not start stderr reader: {}", e);
            None
        }
    }
}

/// Collected stderr tail; empty when nothing was captured
pub(crate) fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Check that an executable answers `-version`
pub fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        let ntsc = parse_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_metadata_from_probe_json() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "width": 64, "height": 48,
                 "avg_frame_rate": "30000/1001", "nb_frames": "120"},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "4.0"}
        }"#;
        let probe: ProbeOutput = serde_json::from_str(json).unwrap();
        let meta = metadata_from_probe(&probe).unwrap();
        assert_eq!(meta.frame_rate, 29);
        assert_eq!(meta.frame_count, 120);
        assert_eq!((meta.width, meta.height), (64, 48));
        assert!(meta.has_audio);
    }

    #[test]
    fn test_metadata_falls_back_to_format_duration() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 8, "height": 8, "avg_frame_rate": "25/1"}],
            "format": {"duration": "2.0"}
        }"#;
        let probe: ProbeOutput = serde_json::from_str(json).unwrap();
        let meta = metadata_from_probe(&probe).unwrap();
        assert_eq!(meta.frame_count, 50);
        assert!(!meta.has_audio);
    }

    #[test]
    fn test_probe_without_video_stream() {
        let probe: ProbeOutput =
            serde_json::from_str(r#"{"streams": [{"codec_type": "audio"}]}"#).unwrap();
        assert!(metadata_from_probe(&probe).is_none());
    }

    /// Executable shell script standing in for ffmpeg
    #[cfg(unix)]
    pub(crate) fn fake_tool(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn scripted_decoder(tool: &Path) -> FfmpegDecoder {
        let mut decoder = FfmpegDecoder::new("clip.mp4", tool.to_str().unwrap(), "unused-ffprobe");
        decoder.metadata = Some(VideoMetadata {
            frame_rate: 30,
            frame_count: 2,
            width: 2,
            height: 2,
            has_audio: false,
        });
        decoder
    }

    #[cfg(unix)]
    fn decode_with_timeout(mut decoder: FfmpegDecoder) -> Result<FrameSequence> {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(decoder.decode());
        });
        rx.recv_timeout(std::time::Duration::from_secs(20))
            .expect("decoder did not finish")
    }

    #[cfg(unix)]
    #[test]
    fn test_noisy_stderr_does_not_stall_decoding() {
        let dir = tempfile::tempdir().unwrap();
        // Far more diagnostics than a pipe buffer holds, then two 2x2 frames
        let tool = fake_tool(
            dir.path(),
            "head -c 300000 /dev/zero | tr '\\0' 'e' >&2\nhead -c 24 /dev/zero",
        );
        let seq = decode_with_timeout(scripted_decoder(&tool)).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.dimensions(), Some((2, 2)));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_decode_reports_stderr_tail() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            dir.path(),
            "head -c 300000 /dev/zero | tr '\\0' 'e' >&2\necho 'moov atom not found' >&2\nexit 1",
        );
        let err = decode_with_timeout(scripted_decoder(&tool)).unwrap_err();
        match err {
            crate::VidfxError::Video(VideoError::DecodeFailure { reason }) => {
                assert!(reason.ends_with("moov atom not found"), "{}", reason);
                assert!(reason.len() < STDERR_TAIL + 100);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_memory_decoder_is_single_use() {
        let seq = FrameSequence::solid(3, 30, 4, 4, [1, 2, 3]).unwrap();
        let mut decoder = MemoryDecoder::new(seq);
        assert_eq!(decoder.metadata().unwrap().frame_count, 3);
        assert_eq!(decoder.decode().unwrap().len(), 3);
        assert!(decoder.decode().is_err());
    }

    #[test]
    fn test_memory_decoder_rejects_empty() {
        let seq = FrameSequence::new(Vec::new(), 30).unwrap();
        let mut decoder = MemoryDecoder::new(seq);
        assert!(matches!(
            decoder.decode(),
            Err(crate::VidfxError::Video(VideoError::EmptySequence))
        ));
    }
}
