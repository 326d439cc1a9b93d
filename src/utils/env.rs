//! Environment and property handling utilities
//!
//! Provides the built-in resolver contexts (`env.` and `sys.`) and helpers for
//! `key=value` property overrides.

use crate::core::substitution::ResolverContext;
use crate::error::{EngineError, Result};
use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;
use tracing::debug;

/// Prefix marking a global property override token (`-Dname=value`)
pub const PROPERTY_FLAG: &str = "-D";

/// Resolves names against the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvContext;

impl ResolverContext for EnvContext {
    fn lookup(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// Resolves names against a fixed property table
#[derive(Debug, Clone, Default)]
pub struct PropertiesContext {
    properties: BTreeMap<String, String>,
}

impl PropertiesContext {
    pub fn new(properties: BTreeMap<String, String>) -> Self {
        Self { properties }
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl ResolverContext for PropertiesContext {
    fn lookup(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }
}

/// Property overrides layered over another context, consulted first
pub struct OverlayContext {
    overrides: BTreeMap<String, String>,
    fallback: Option<Arc<dyn ResolverContext>>,
}

impl OverlayContext {
    pub fn new(overrides: BTreeMap<String, String>, fallback: Option<Arc<dyn ResolverContext>>) -> Self {
        Self { overrides, fallback }
    }
}

impl std::fmt::Debug for OverlayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayContext")
            .field("overrides", &self.overrides)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl ResolverContext for OverlayContext {
    fn lookup(&self, key: &str) -> Option<String> {
        self.overrides
            .get(key)
            .cloned()
            .or_else(|| self.fallback.as_ref().and_then(|context| context.lookup(key)))
    }
}

/// Parse `key=value`; the value may be empty, the key may not
pub fn parse_key_value(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(EngineError::config(format!(
            "Expected key=value, got '{raw}'"
        ))),
    }
}

/// Split global tokens into `-Dname=value` overrides and everything else
pub fn extract_property_overrides(tokens: &[String]) -> Result<(BTreeMap<String, String>, Vec<String>)> {
    let mut overrides = BTreeMap::new();
    let mut remaining = Vec::new();

    for token in tokens {
        match token.strip_prefix(PROPERTY_FLAG) {
            Some(assignment) if assignment.contains('=') => {
                let (key, value) = parse_key_value(assignment)
                    .map_err(|_| EngineError::unknown_option(token.clone()))?;
                debug!("Property override: {}={}", key, value);
                overrides.insert(key, value);
            }
            _ => remaining.push(token.clone()),
        }
    }

    Ok((overrides, remaining))
}
