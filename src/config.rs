use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::{
    effects::{
        params::EffectEntry,
        shake::motion::{DEFAULT_HIGH_CUT_HZ, DEFAULT_LOW_CUT_HZ},
    },
    error::{ConfigError, Result},
    video::encoder::EncodeParams,
};

/// Main configuration for vidfx
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Encoding and processing settings
    pub video: VideoConfig,

    /// Camera shake generation settings
    pub shake: ShakeConfig,

    /// Ordered effect stages, one `[[pipeline]]` table each
    pub pipeline: Vec<EffectEntry>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.video.validate()?;
        self.shake.validate()?;
        Ok(())
    }
}

/// Video encoding and processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// FFmpeg codec name
    pub codec: String,

    /// Output pixel format
    pub pixel_format: String,

    /// Quality setting (0-100, higher is better)
    pub quality: u8,

    /// Number of parallel processing threads
    pub processing_threads: usize,

    /// Re-attach the source audio track to the output
    pub preserve_audio: bool,

    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        let params = EncodeParams::default();
        Self {
            codec: params.codec,
            pixel_format: params.pixel_format,
            quality: params.quality,
            processing_threads: num_cpus::get(),
            preserve_audio: true,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

impl VideoConfig {
    /// Encoder settings derived from this configuration
    pub fn encode_params(&self) -> EncodeParams {
        EncodeParams {
            codec: self.codec.clone(),
            pixel_format: self.pixel_format.clone(),
            quality: self.quality,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.processing_threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "video.processing_threads".to_string(),
                value: self.processing_threads.to_string()
            }.into());
        }

        if self.quality > 100 {
            return Err(ConfigError::InvalidValue {
                key: "video.quality".to_string(),
                value: self.quality.to_string()
            }.into());
        }

        if self.codec.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "video.codec".to_string(),
                value: self.codec.clone()
            }.into());
        }

        Ok(())
    }
}

/// Shake motion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShakeConfig {
    /// Seed for the motion generator; random per run when unset
    pub seed: Option<u64>,

    /// Band-pass edges in Hz
    pub low_cut_hz: f64,
    pub high_cut_hz: f64,

    /// Motion (px) above which frames get motion blur
    pub motion_blur_threshold: f64,

    /// Largest motion blur kernel
    pub max_blur_kernel: u32,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            seed: None,
            low_cut_hz: DEFAULT_LOW_CUT_HZ,
            high_cut_hz: DEFAULT_HIGH_CUT_HZ,
            motion_blur_threshold: 2.0,
            max_blur_kernel: 15,
        }
    }
}

impl ShakeConfig {
    fn validate(&self) -> Result<()> {
        if !(self.low_cut_hz > 0.0 && self.low_cut_hz < self.high_cut_hz) {
            return Err(ConfigError::InvalidValue {
                key: "shake.cutoff_range".to_string(),
                value: format!("{}-{}", self.low_cut_hz, self.high_cut_hz)
            }.into());
        }

        if !self.motion_blur_threshold.is_finite() || self.motion_blur_threshold < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "shake.motion_blur_threshold".to_string(),
                value: self.motion_blur_threshold.to_string()
            }.into());
        }

        if self.max_blur_kernel == 0 || self.max_blur_kernel % 2 == 0 {
            return Err(ConfigError::InvalidValue {
                key: "shake.max_blur_kernel".to_string(),
                value: self.max_blur_kernel.to_string()
            }.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.pipeline.is_empty());
        assert_eq!(config.video.codec, "mpeg4");
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.shake.seed = Some(42);
        original_config.pipeline = vec![
            EffectEntry::new("flip").with("direction", "RotateCW90"),
            EffectEntry::new("speed").with("mode", "up").with("factor", 2.5),
        ];

        // Save and load
        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(
            &file_path,
            "[video]\nquality = 60\n\n[[pipeline]]\neffect = \"reverse\"\n",
        )
        .unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.video.quality, 60);
        assert_eq!(config.video.pixel_format, "yuv420p");
        assert_eq!(config.shake.max_blur_kernel, 15);
        assert_eq!(config.pipeline, vec![EffectEntry::new("reverse")]);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempdir().unwrap();
        assert!(Config::from_file(dir.path().join("absent.toml")).is_err());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[video\nquality =").unwrap();
        let err = Config::from_file(&bad).unwrap_err();
        assert!(matches!(
            err,
            crate::VidfxError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        config.video.processing_threads = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.shake.low_cut_hz = 20.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.shake.max_blur_kernel = 8;
        assert!(config.validate().is_err());
    }
}
