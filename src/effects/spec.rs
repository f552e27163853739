use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::{EffectError, Result};

/// Largest accepted kernel for the standalone blur
pub const MAX_BLUR_STRENGTH: u32 = 101;

/// Speed factor domain shared by speed-up and slow motion
pub const SPEED_FACTOR_RANGE: (f64, f64) = (1.0, 4.0);

/// Geometric remap of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Identity,
    RotateCw90,
    RotateCcw90,
    FlipVertical,
    FlipHorizontal,
    /// Vertical flip followed by a 180° rotation
    Down,
}

impl FlipDirection {
    /// Whether the output swaps width and height
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, FlipDirection::RotateCw90 | FlipDirection::RotateCcw90)
    }
}

impl FromStr for FlipDirection {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rotatecw90" | "right" => Ok(FlipDirection::RotateCw90),
            "rotateccw90" | "left" => Ok(FlipDirection::RotateCcw90),
            "flipvertical" | "vertical" | "up" => Ok(FlipDirection::FlipVertical),
            "fliphorizontal" | "horizontal" => Ok(FlipDirection::FlipHorizontal),
            "down" | "flipverticalthenrotate180" => Ok(FlipDirection::Down),
            "none" | "identity" => Ok(FlipDirection::Identity),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FlipDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlipDirection::Identity => "Identity",
            FlipDirection::RotateCw90 => "RotateCW90",
            FlipDirection::RotateCcw90 => "RotateCCW90",
            FlipDirection::FlipVertical => "FlipVertical",
            FlipDirection::FlipHorizontal => "FlipHorizontal",
            FlipDirection::Down => "Down",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedMode {
    Up,
    Down,
}

impl FromStr for SpeedMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" | "speedup" | "fast" => Ok(SpeedMode::Up),
            "down" | "slow" | "slowmotion" => Ok(SpeedMode::Down),
            _ => Err(()),
        }
    }
}

/// Luma remap preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneTheme {
    Normal,
    Inverted,
    Bright,
    Dark,
}

impl FromStr for ToneTheme {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" | "gray" | "grayscale" => Ok(ToneTheme::Normal),
            "inverted" | "invert" | "negative" => Ok(ToneTheme::Inverted),
            "bright" => Ok(ToneTheme::Bright),
            "dark" => Ok(ToneTheme::Dark),
            _ => Err(()),
        }
    }
}

/// Domain in which a shake magnitude is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShakeScale {
    /// 0-1 control, rescaled to 1-8
    Unit,
    /// 1-8 seismic magnitude, used as is
    Seismic,
}

impl ShakeScale {
    pub fn range(self) -> (f64, f64) {
        match self {
            ShakeScale::Unit => (0.0, 1.0),
            ShakeScale::Seismic => (1.0, 8.0),
        }
    }
}

impl FromStr for ShakeScale {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unit" | "normalized" => Ok(ShakeScale::Unit),
            "seismic" | "richter" => Ok(ShakeScale::Seismic),
            _ => Err(()),
        }
    }
}

/// How a stage consumes its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One output per input frame, no state between frames
    Streaming,
    /// Streamed with the previous frame retained
    Pairwise,
    /// Needs the whole sequence before the first output
    Materialized,
}

/// A validated choice of operator plus its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum EffectSpec {
    Flip { direction: FlipDirection },
    Speed { mode: SpeedMode, factor: f64 },
    Reverse,
    Tone { theme: ToneTheme },
    Sketch,
    MotionDiff { invert: bool },
    Shake {
        magnitude: f64,
        scale: ShakeScale,
        seed: Option<u64>,
    },
    Blur { strength: u32 },
}

impl EffectSpec {
    /// Operator name as used by the configuration surface
    pub fn name(&self) -> &'static str {
        match self {
            EffectSpec::Flip { .. } => "flip",
            EffectSpec::Speed { .. } => "speed",
            EffectSpec::Reverse => "reverse",
            EffectSpec::Tone { .. } => "tone",
            EffectSpec::Sketch => "sketch",
            EffectSpec::MotionDiff { .. } => "motionDiff",
            EffectSpec::Shake { .. } => "shake",
            EffectSpec::Blur { .. } => "blur",
        }
    }

    /// Reject non-finite values and clamp the rest into their declared domain
    pub fn validate(self) -> Result<Self> {
        let name = self.name();
        let spec = match self {
            EffectSpec::Speed { mode, factor } => {
                let factor = clamp_finite(name, "factor", factor, SPEED_FACTOR_RANGE)?;
                EffectSpec::Speed { mode, factor }
            }
            EffectSpec::Shake { magnitude, scale, seed } => {
                let magnitude = clamp_finite(name, "magnitude", magnitude, scale.range())?;
                EffectSpec::Shake { magnitude, scale, seed }
            }
            EffectSpec::Blur { strength } => {
                let mut clamped = strength.clamp(1, MAX_BLUR_STRENGTH);
                if clamped % 2 == 0 {
                    clamped += 1;
                }
                if clamped != strength {
                    warn!("blur strength {} adjusted to odd kernel {}", strength, clamped);
                }
                EffectSpec::Blur { strength: clamped }
            }
            other => other,
        };
        Ok(spec)
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        match self {
            // Shake sizes its motion series from the whole clip
            EffectSpec::Reverse | EffectSpec::Shake { .. } => ExecutionMode::Materialized,
            EffectSpec::MotionDiff { .. } => ExecutionMode::Pairwise,
            _ => ExecutionMode::Streaming,
        }
    }

    /// Whether the stage changes frame count, order or rate
    pub fn changes_timing(&self) -> bool {
        match self {
            EffectSpec::Speed { factor, .. } => integer_factor(*factor) > 1,
            EffectSpec::Reverse | EffectSpec::MotionDiff { .. } => true,
            _ => false,
        }
    }

    /// Whether the stage changes frame dimensions
    pub fn changes_geometry(&self) -> bool {
        matches!(self, EffectSpec::Flip { direction } if direction.swaps_dimensions())
    }

    /// Frame rate this stage produces from `input_rate`
    pub fn output_rate(&self, input_rate: u32) -> Result<u32> {
        match self {
            EffectSpec::Speed {
                mode: SpeedMode::Down,
                factor,
            } => crate::effects::temporal::slow_motion_rate(input_rate, integer_factor(*factor)),
            _ => Ok(input_rate),
        }
    }

    /// Seismic-scale magnitude (1-8) for a shake stage
    pub fn effective_magnitude(&self) -> Option<f64> {
        match self {
            EffectSpec::Shake {
                magnitude,
                scale: ShakeScale::Unit,
                ..
            } => Some(1.0 + magnitude * 7.0),
            EffectSpec::Shake {
                magnitude,
                scale: ShakeScale::Seismic,
                ..
            } => Some(*magnitude),
            _ => None,
        }
    }
}

impl fmt::Display for EffectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectSpec::Flip { direction } => write!(f, "flip({})", direction),
            EffectSpec::Speed { mode, factor } => write!(f, "speed({:?}, {}x)", mode, factor),
            EffectSpec::Tone { theme } => write!(f, "tone({:?})", theme),
            EffectSpec::MotionDiff { invert } => write!(f, "motionDiff(invert={})", invert),
            EffectSpec::Shake { magnitude, scale, .. } => {
                write!(f, "shake({} {:?})", magnitude, scale)
            }
            EffectSpec::Blur { strength } => write!(f, "blur({})", strength),
            other => f.write_str(other.name()),
        }
    }
}

/// Speed factors act in whole frames
pub fn integer_factor(factor: f64) -> u32 {
    factor.round().max(1.0) as u32
}

fn clamp_finite(effect: &str, parameter: &str, value: f64, (lo, hi): (f64, f64)) -> Result<f64> {
    if !value.is_finite() {
        return Err(EffectError::InvalidParameter {
            effect: effect.to_string(),
            parameter: parameter.to_string(),
            value: value.to_string(),
        }
        .into());
    }
    let clamped = value.clamp(lo, hi);
    if clamped != value {
        warn!(
            "{}.{} = {} outside [{}, {}], clamped to {}",
            effect, parameter, value, lo, hi, clamped
        );
    }
    Ok(clamped)
}
