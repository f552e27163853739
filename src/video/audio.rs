use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{Result, VideoError};

/// Audio track extracted from the source, kept alive until it is muxed
///
/// The backing temporary directory (if any) is removed when the handle drops.
#[derive(Debug)]
pub struct AudioHandle {
    path: PathBuf,
    _scratch: Option<TempDir>,
}

impl AudioHandle {
    /// Handle pointing at an existing audio file owned by the caller
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            _scratch: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Extracts the original audio and re-attaches it to a video-only stream
pub trait AudioMuxer: Send {
    /// Pull the first audio stream out of `source`; `None` when there is none
    fn extract_audio(&mut self, source: &Path) -> Result<Option<AudioHandle>>;

    /// Combine `video_only` with `audio` into `output`
    fn mux(&mut self, video_only: &Path, audio: &AudioHandle, output: &Path) -> Result<PathBuf>;
}

/// Audio extraction and muxing through the `ffmpeg` executable
pub struct FfmpegAudioMuxer {
    ffmpeg: String,
}

impl FfmpegAudioMuxer {
    pub fn new(ffmpeg: &str) -> Self {
        Self {
            ffmpeg: ffmpeg.to_string(),
        }
    }

    fn run(&self, cmd: &mut Command) -> Result<()> {
        let output = cmd.output().map_err(|_| VideoError::ToolNotFound {
            tool: self.ffmpeg.clone(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::AudioMuxFailure {
                reason: format!("FFmpeg failed: {}", stderr.trim()),
            }
            .into());
        }
        Ok(())
    }
}

impl AudioMuxer for FfmpegAudioMuxer {
    fn extract_audio(&mut self, source: &Path) -> Result<Option<AudioHandle>> {
        let scratch = tempfile::Builder::new().prefix("vidfx_audio_").tempdir()?;
        // Matroska accepts any codec, so the stream is copied untouched
        let target = scratch.path().join("audio.mka");

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y", "-nostdin", "-i"])
            .arg(source)
            .args(["-vn", "-map", "0:a:0?", "-c:a", "copy"])
            .arg(&target);
        self.run(&mut cmd)?;

        // The optional map yields an empty container when there is no audio
        let has_audio = std::fs::metadata(&target)
            .map(|m| m.len() > 0)
            .unwrap_or(false)
            && probe_has_stream(&self.ffmpeg, &target);

        if !has_audio {
            info!("No audio track found in {}", source.display());
            return Ok(None);
        }

        debug!("Extracted audio to {}", target.display());
        Ok(Some(AudioHandle {
            path: target,
            _scratch: Some(scratch),
        }))
    }

    fn mux(&mut self, video_only: &Path, audio: &AudioHandle, output: &Path) -> Result<PathBuf> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y", "-nostdin", "-i"])
            .arg(video_only)
            .arg("-i")
            .arg(audio.path())
            .args(["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac", "-shortest"])
            .arg(output);

        if let Err(e) = self.run(&mut cmd) {
            let _ = std::fs::remove_file(output);
            return Err(e);
        }

        info!("Re-attached audio: {}", output.display());
        Ok(output.to_path_buf())
    }
}

/// `ffmpeg -i file` fails on a container without streams
fn probe_has_stream(ffmpeg: &str, path: &Path) -> bool {
    Command::new(ffmpeg)
        .args(["-v", "error", "-nostdin", "-i"])
        .arg(path)
        .args(["-map", "0:a:0", "-f", "null", "-"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_from_path() {
        let handle = AudioHandle::from_path("/tmp/track.aac");
        assert_eq!(handle.path(), Path::new("/tmp/track.aac"));
    }

    #[test]
    fn test_extract_without_ffmpeg_fails() {
        let mut muxer = FfmpegAudioMuxer::new("definitely-not-ffmpeg-xyz");
        let result = muxer.extract_audio(Path::new("input.mp4"));
        assert!(matches!(
            result,
            Err(crate::VidfxError::Video(VideoError::ToolNotFound { .. }))
        ));
    }
}
