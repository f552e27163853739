use std::collections::HashMap;

use crate::{
    effects::{
        params::{EffectEntry, EffectParams},
        spec::{EffectSpec, FlipDirection, ShakeScale, SpeedMode, ToneTheme},
    },
    error::{EffectError, Result},
};

/// Builds an unvalidated [`EffectSpec`] from an entry's parameters
pub type ParseFn = fn(&EffectParams) -> Result<EffectSpec>;

/// Documentation and parser for one operator
#[derive(Clone)]
pub struct EffectDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// `(key, description)` for every accepted parameter
    pub parameters: &'static [(&'static str, &'static str)],
    pub parse: ParseFn,
}

/// Registry for the operators a pipeline may name
///
/// Lookups ignore case, `_` and `-`, so `motionDiff`, `motion_diff` and
/// `MOTION-DIFF` all resolve to the same descriptor.
pub struct EffectRegistry {
    effects: HashMap<String, EffectDescriptor>,
}

impl EffectRegistry {
    /// Create a new registry with all built-in operators
    pub fn new() -> Self {
        let mut registry = Self {
            effects: HashMap::new(),
        };
        registry.register_builtin_effects();
        registry
    }

    fn register_builtin_effects(&mut self) {
        self.register(EffectDescriptor {
            name: "flip",
            description: "Rotate by 90 degrees or mirror the frame",
            parameters: &[(
                "direction",
                "RotateCW90 | RotateCCW90 | FlipVertical | FlipHorizontal | Down",
            )],
            parse: parse_flip,
        });
        self.register(EffectDescriptor {
            name: "speed",
            description: "Drop frames to speed up or repeat them for slow motion",
            parameters: &[("mode", "up | down"), ("factor", "1.0 - 4.0, default 2.0")],
            parse: parse_speed,
        });
        self.register(EffectDescriptor {
            name: "reverse",
            description: "Play the clip backwards",
            parameters: &[],
            parse: |_| Ok(EffectSpec::Reverse),
        });
        self.register(EffectDescriptor {
            name: "tone",
            description: "Grayscale with a tone theme",
            parameters: &[("theme", "normal | inverted | bright | dark, default normal")],
            parse: parse_tone,
        });
        self.register(EffectDescriptor {
            name: "sketch",
            description: "Pencil sketch by dodge blending",
            parameters: &[],
            parse: |_| Ok(EffectSpec::Sketch),
        });
        self.register(EffectDescriptor {
            name: "motionDiff",
            description: "Silhouette of pixels that moved since the previous frame",
            parameters: &[
                ("invert", "true for white motion on black, default false"),
                ("theme", "light | dark, alias for invert"),
            ],
            parse: parse_motion_diff,
        });
        self.register(EffectDescriptor {
            name: "shake",
            description: "Seismic camera shake",
            parameters: &[
                ("magnitude", "0.0 - 1.0 (unit) or 1.0 - 8.0 (seismic), default 0.5"),
                ("scale", "unit | seismic, default unit"),
                ("seed", "non-negative integer for reproducible motion"),
            ],
            parse: parse_shake,
        });
        self.register(EffectDescriptor {
            name: "blur",
            description: "Uniform Gaussian blur",
            parameters: &[("strength", "odd kernel size 1 - 101, default 5")],
            parse: parse_blur,
        });
    }

    /// Register an operator, replacing any with the same normalised name
    pub fn register(&mut self, descriptor: EffectDescriptor) {
        self.effects.insert(normalise(descriptor.name), descriptor);
    }

    pub fn descriptor(&self, name: &str) -> Option<&EffectDescriptor> {
        self.effects.get(&normalise(name))
    }

    /// Turn a configuration entry into a validated [`EffectSpec`]
    ///
    /// Unknown operators, unknown keys and mistyped values are rejected;
    /// in-range clamping happens in [`EffectSpec::validate`].
    pub fn parse(&self, entry: &EffectEntry) -> Result<EffectSpec> {
        let descriptor = self
            .descriptor(&entry.name)
            .ok_or_else(|| EffectError::UnknownEffect {
                name: entry.name.clone(),
            })?;

        if let Some(key) = entry
            .params
            .keys()
            .find(|key| !descriptor.parameters.iter().any(|(k, _)| k == key))
        {
            return Err(EffectError::InvalidParameter {
                effect: descriptor.name.to_string(),
                parameter: key.to_string(),
                value: "<unknown parameter>".to_string(),
            }
            .into());
        }

        (descriptor.parse)(&entry.params)?.validate()
    }

    /// All registered operator names, sorted
    pub fn available_effects(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.effects.values().map(|d| d.name).collect();
        names.sort_unstable();
        names
    }

    pub fn has_effect(&self, name: &str) -> bool {
        self.effects.contains_key(&normalise(name))
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalise(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn invalid(effect: &str, parameter: &str, value: impl ToString) -> EffectError {
    EffectError::InvalidParameter {
        effect: effect.to_string(),
        parameter: parameter.to_string(),
        value: value.to_string(),
    }
}

/// Parse a required or defaulted enumerated string parameter
fn enumerated<T: std::str::FromStr>(
    params: &EffectParams,
    effect: &str,
    key: &str,
    default: Option<T>,
) -> Result<T> {
    match params.str(effect, key)? {
        Some(text) => text.parse().map_err(|_| invalid(effect, key, text).into()),
        None => default.ok_or_else(|| invalid(effect, key, "<missing>").into()),
    }
}

fn parse_flip(params: &EffectParams) -> Result<EffectSpec> {
    let direction = enumerated::<FlipDirection>(params, "flip", "direction", None)?;
    Ok(EffectSpec::Flip { direction })
}

fn parse_speed(params: &EffectParams) -> Result<EffectSpec> {
    let mode = enumerated::<SpeedMode>(params, "speed", "mode", None)?;
    let factor = params.f64("speed", "factor")?.unwrap_or(2.0);
    Ok(EffectSpec::Speed { mode, factor })
}

fn parse_tone(params: &EffectParams) -> Result<EffectSpec> {
    let theme = enumerated(params, "tone", "theme", Some(ToneTheme::Normal))?;
    Ok(EffectSpec::Tone { theme })
}

fn parse_motion_diff(params: &EffectParams) -> Result<EffectSpec> {
    let from_theme = match params.str("motionDiff", "theme")? {
        None => None,
        Some(t) if t.eq_ignore_ascii_case("light") => Some(true),
        Some(t) if t.eq_ignore_ascii_case("dark") => Some(false),
        Some(t) => return Err(invalid("motionDiff", "theme", t).into()),
    };
    let invert = match (params.bool("motionDiff", "invert")?, from_theme) {
        (Some(a), Some(b)) if a != b => {
            return Err(invalid("motionDiff", "theme", "conflicts with invert").into())
        }
        (Some(v), _) | (None, Some(v)) => v,
        (None, None) => false,
    };
    Ok(EffectSpec::MotionDiff { invert })
}

fn parse_shake(params: &EffectParams) -> Result<EffectSpec> {
    let scale = enumerated(params, "shake", "scale", Some(ShakeScale::Unit))?;
    let magnitude = params.f64("shake", "magnitude")?.unwrap_or(0.5);
    let seed = match params.i64("shake", "seed")? {
        Some(s) if s < 0 => return Err(invalid("shake", "seed", s).into()),
        Some(s) => Some(s as u64),
        None => None,
    };
    Ok(EffectSpec::Shake {
        magnitude,
        scale,
        seed,
    })
}

fn parse_blur(params: &EffectParams) -> Result<EffectSpec> {
    let strength = match params.i64("blur", "strength")? {
        Some(s) if s < 1 => return Err(invalid("blur", "strength", s).into()),
        Some(s) => s.min(u32::MAX as i64) as u32,
        None => 5,
    };
    Ok(EffectSpec::Blur { strength })
}
