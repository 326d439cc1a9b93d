//! Textual value conversion
//!
//! Converts raw tokens into the declared parameter type. Native kinds (text,
//! enums) are handled inline; everything else goes through a registry keyed by the
//! exact type key, which callers populate with [`ConverterRegistry::register`].

use crate::core::spec::{TypeSpec, ValueKind};
use crate::core::value::Value;
use crate::error::ConversionError;
use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Converts raw text into a value of one type
pub trait Converter: Send + Sync {
    fn convert(&self, raw: &str) -> anyhow::Result<Value>;
}

impl<F> Converter for F
where
    F: Fn(&str) -> anyhow::Result<Value> + Send + Sync,
{
    fn convert(&self, raw: &str) -> anyhow::Result<Value> {
        self(raw)
    }
}

/// Converter lookup table keyed by exact type key
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.converters.keys().collect();
        keys.sort();
        f.debug_struct("ConverterRegistry").field("keys", &keys).finish()
    }
}

impl ConverterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the stock converters installed
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("bool", parse_bool);
        registry.register("int", |raw: &str| {
            raw.trim()
                .parse::<i64>()
                .map(Value::Int)
                .with_context(|| format!("'{raw}' is not an integer"))
        });
        registry.register("float", |raw: &str| {
            raw.trim()
                .parse::<f64>()
                .map(Value::Float)
                .with_context(|| format!("'{raw}' is not a number"))
        });
        registry.register("char", |raw: &str| {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Text(c.to_string())),
                _ => bail!("expected exactly one character, got '{raw}'"),
            }
        });
        registry.register("date", |raw: &str| {
            let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .with_context(|| format!("'{raw}' is not a date (YYYY-MM-DD)"))?;
            Ok(Value::custom("date", date.to_string(), date))
        });
        registry.register("datetime", |raw: &str| {
            let stamp = DateTime::parse_from_rfc3339(raw.trim())
                .with_context(|| format!("'{raw}' is not an RFC 3339 timestamp"))?;
            Ok(Value::custom("datetime", stamp.to_rfc3339(), stamp))
        });
        registry.register("path", |raw: &str| {
            Ok(Value::custom("path", raw, PathBuf::from(raw)))
        });
        registry.register("regex", |raw: &str| {
            let pattern = Regex::new(raw).with_context(|| format!("invalid regex '{raw}'"))?;
            Ok(Value::custom("regex", raw, pattern))
        });
        registry.register("glob", |raw: &str| {
            let pattern =
                glob::Pattern::new(raw).with_context(|| format!("invalid glob '{raw}'"))?;
            Ok(Value::custom("glob", raw, pattern))
        });
        registry
    }

    /// Register a conversion function, replacing any previous one for the key
    pub fn register<F>(&mut self, key: impl Into<String>, convert: F)
    where
        F: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.converters.insert(key.into(), Arc::new(convert));
    }

    /// Register a shared converter object
    pub fn register_converter(&mut self, key: impl Into<String>, converter: Arc<dyn Converter>) {
        self.converters.insert(key.into(), converter);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.converters.contains_key(key)
    }

    /// Convert `raw` to `target` for the parameter called `name`
    #[instrument(skip(self, target), fields(ty = %target))]
    pub fn convert(
        &self,
        raw: Value,
        target: &TypeSpec,
        name: &str,
    ) -> Result<Value, ConversionError> {
        if raw.is_null() || satisfies(&raw, &target.kind) {
            return Ok(raw);
        }

        let text = match raw {
            Value::Text(text) => text,
            other => {
                return Err(ConversionError::TypeMismatch {
                    name: name.to_string(),
                    expected: target.to_string(),
                    found: other.type_label(),
                });
            }
        };

        match &target.kind {
            ValueKind::Enum(enum_type) => {
                let wanted = text.to_uppercase();
                enum_type
                    .constants
                    .iter()
                    .find(|constant| **constant == wanted)
                    .map(|constant| Value::Enum {
                        type_name: enum_type.name.clone(),
                        constant: constant.clone(),
                    })
                    .ok_or_else(|| ConversionError::EnumLookupFailure {
                        name: name.to_string(),
                        value: text.clone(),
                        enum_name: enum_type.name.clone(),
                        constants: enum_type.constants.clone(),
                    })
            }
            kind => {
                let key = kind.key();
                let converter =
                    self.converters
                        .get(key)
                        .ok_or_else(|| ConversionError::NoConverter {
                            name: name.to_string(),
                            target: key.to_string(),
                        })?;
                debug!("Converting '{}' with '{}' converter", text, key);
                converter
                    .convert(&text)
                    .map_err(|source| ConversionError::Failed {
                        name: name.to_string(),
                        value: text.clone(),
                        target: key.to_string(),
                        source: source.into(),
                    })
            }
        }
    }
}

/// Whether a value already has the target kind; numeric kinds are interchangeable
fn satisfies(value: &Value, kind: &ValueKind) -> bool {
    match (value, kind) {
        (Value::Bool(_), ValueKind::Bool) => true,
        (Value::Int(_) | Value::Float(_), k) if k.is_numeric() => true,
        (Value::Text(_), ValueKind::Text) => true,
        (Value::Enum { type_name, .. }, ValueKind::Enum(e)) => *type_name == e.name,
        (Value::Bean(bean), ValueKind::Bean(name)) => bean.type_name == *name,
        (Value::Custom { type_name, .. }, ValueKind::Named(key)) => type_name == key,
        _ => false,
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<Value> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
        "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
        _ => bail!("'{raw}' is not a boolean"),
    }
}
