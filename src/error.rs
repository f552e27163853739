use thiserror::Error;

/// Main error type for the vidfx library
#[derive(Error, Debug)]
pub enum VidfxError {
    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),

    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Errors raised by frame and sequence operators
#[derive(Error, Debug)]
pub enum EffectError {
    #[error("Invalid parameter for '{effect}': {parameter} = {value}")]
    InvalidParameter {
        effect: String,
        parameter: String,
        value: String,
    },

    #[error("Unknown effect: {name}")]
    UnknownEffect { name: String },

    #[error("Missing frame at index {index}")]
    MissingFrame { index: usize },

    #[error("Invalid output frame rate: {rate} fps / factor {factor} is not positive")]
    InvalidRate { rate: u32, factor: u32 },

    #[error("Frame dimensions differ: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// Errors raised at the decode/encode/mux boundary
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Frame sequence is empty")]
    EmptySequence,

    #[error("Video decoding failed: {reason}")]
    DecodeFailure { reason: String },

    #[error("Video encoding failed: {reason}")]
    EncodeFailure { reason: String },

    #[error("Audio re-mux failed: {reason}")]
    AudioMuxFailure { reason: String },

    #[error("Required tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("Unsupported video format: {format}")]
    UnsupportedFormat { format: String },
}

/// Errors raised by the pipeline orchestrator
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage {index} ({stage}) failed: {source}")]
    StageFailed {
        stage: String,
        index: usize,
        #[source]
        source: Box<VidfxError>,
    },

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Invalid pipeline state: {details}")]
    InvalidState { details: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using VidfxError
pub type Result<T> = std::result::Result<T, VidfxError>;

impl VidfxError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Wrap an error as the terminal failure of a named pipeline stage
    pub fn in_stage<S: Into<String>>(self, stage: S, index: usize) -> Self {
        match self {
            // Already attributed, keep the innermost stage
            Self::Pipeline(PipelineError::StageFailed { .. }) => self,
            Self::Pipeline(PipelineError::Cancelled) => self,
            other => Self::Pipeline(PipelineError::StageFailed {
                stage: stage.into(),
                index,
                source: Box::new(other),
            }),
        }
    }

    /// Name of the failing stage, if the error was raised inside one
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Pipeline(PipelineError::StageFailed { stage, .. }) => Some(stage),
            _ => None,
        }
    }

    /// Innermost error, unwrapping stage attribution
    pub fn root(&self) -> &VidfxError {
        match self {
            Self::Pipeline(PipelineError::StageFailed { source, .. }) => source.root(),
            other => other,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self.root() {
            Self::Io(_) => true,
            Self::Video(VideoError::DecodeFailure { .. }) => true,
            Self::Video(VideoError::AudioMuxFailure { .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        let stage = self
            .stage()
            .map(|s| format!(" (stage '{}')", s))
            .unwrap_or_default();

        match self.root() {
            Self::Effect(EffectError::InvalidParameter { effect, parameter, value }) => {
                format!("Effect '{}' rejected {} = {}{}", effect, parameter, value, stage)
            }
            Self::Effect(EffectError::UnknownEffect { name }) => {
                format!(
                    "Effect '{}' not found. Available effects: flip, speed, reverse, tone, sketch, motionDiff, shake, blur",
                    name
                )
            }
            Self::Effect(EffectError::InvalidRate { rate, factor }) => {
                format!(
                    "Slowing {} fps by {}x would produce an unplayable frame rate{}",
                    rate, factor, stage
                )
            }
            Self::Video(VideoError::EmptySequence) => {
                format!("The video contains no frames{}", stage)
            }
            Self::Video(VideoError::ToolNotFound { tool }) => {
                format!("'{}' was not found. Please install FFmpeg and make sure it is on PATH.", tool)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            Self::Pipeline(PipelineError::Cancelled) => "Processing was cancelled".to_string(),
            other => format!("{}{}", other, stage),
        }
    }
}
