use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{EffectError, VidfxError};

/// Flexible parameter value that can hold different types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(i) => Some(*i),
            ParamValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Infer the most specific value type from command-line text
    pub fn infer(text: &str) -> Self {
        let text = text.trim();
        if let Ok(b) = text.parse::<bool>() {
            return ParamValue::Bool(b);
        }
        if let Ok(i) = text.parse::<i64>() {
            return ParamValue::Integer(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return ParamValue::Float(f);
        }
        ParamValue::String(text.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Integer(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

/// Named parameters of one effect entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectParams {
    parameters: BTreeMap<String, ParamValue>,
}

impl EffectParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter value
    pub fn set<K: Into<String>, V: Into<ParamValue>>(mut self, key: K, value: V) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.parameters.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Typed lookups: `Ok(None)` when absent, `InvalidParameter` when the type is wrong
    pub fn f64(&self, effect: &str, key: &str) -> Result<Option<f64>, EffectError> {
        self.typed(effect, key, ParamValue::as_f64)
    }

    pub fn i64(&self, effect: &str, key: &str) -> Result<Option<i64>, EffectError> {
        self.typed(effect, key, ParamValue::as_i64)
    }

    pub fn bool(&self, effect: &str, key: &str) -> Result<Option<bool>, EffectError> {
        self.typed(effect, key, ParamValue::as_bool)
    }

    pub fn str(&self, effect: &str, key: &str) -> Result<Option<&str>, EffectError> {
        self.typed(effect, key, ParamValue::as_str)
    }

    fn typed<'a, T, F>(&'a self, effect: &str, key: &str, f: F) -> Result<Option<T>, EffectError>
    where
        F: Fn(&'a ParamValue) -> Option<T>,
    {
        match self.parameters.get(key) {
            None => Ok(None),
            Some(value) => f(value).map(Some).ok_or_else(|| EffectError::InvalidParameter {
                effect: effect.to_string(),
                parameter: key.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// One `(operatorName, parameterMap)` pair of the pipeline configuration
///
/// In TOML this is a `[[pipeline]]` table with `effect = "<name>"` and the
/// parameters inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectEntry {
    #[serde(rename = "effect")]
    pub name: String,

    #[serde(flatten)]
    pub params: EffectParams,
}

impl EffectEntry {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            params: EffectParams::new(),
        }
    }

    pub fn with<K: Into<String>, V: Into<ParamValue>>(mut self, key: K, value: V) -> Self {
        self.params = self.params.set(key, value);
        self
    }
}

/// Parses `name` or `name:key=value,key=value`
impl FromStr for EffectEntry {
    type Err = VidfxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = match s.split_once(':') {
            Some((name, rest)) => (name.trim(), rest),
            None => (s.trim(), ""),
        };
        if name.is_empty() {
            return Err(EffectError::UnknownEffect { name: s.to_string() }.into());
        }

        let mut entry = EffectEntry::new(name);
        for pair in rest.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| EffectError::InvalidParameter {
                effect: name.to_string(),
                parameter: pair.to_string(),
                value: "<missing>".to_string(),
            })?;
            entry = entry.with(key.trim(), ParamValue::infer(value));
        }
        Ok(entry)
    }
}
