//! Configuration management for the cmdbind front-end
//!
//! Centralizes configuration options and provides validation.

use crate::{
    cli::{Args, CatalogArgs},
    error::{EngineError, Result},
    utils::env::parse_key_value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Enable debug logging
    pub debug: bool,
    /// Catalog file, for commands that read one
    pub catalog_path: Option<PathBuf>,
    /// Inputs to `${...}` resolution
    pub resolution: ResolutionConfig,
}

/// Resolution configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Base properties behind the `sys.` context
    pub properties: BTreeMap<String, String>,
    /// Generic default-value context entries
    pub defaults: BTreeMap<String, String>,
}

impl Config {
    /// Create configuration from command line arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = Self {
            debug: args.debug,
            ..Self::default()
        };

        if let Some(catalog) = args.command.catalog_args() {
            config.apply_catalog_args(catalog)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_catalog_args(&mut self, args: &CatalogArgs) -> Result<()> {
        self.catalog_path = Some(args.catalog.clone());
        for raw in &args.properties {
            let (key, value) = parse_key_value(raw)?;
            self.resolution.properties.insert(key, value);
        }
        for raw in &args.defaults {
            let (key, value) = parse_key_value(raw)?;
            self.resolution.defaults.insert(key, value);
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.catalog_path {
            if !path.is_file() {
                return Err(EngineError::config(format!(
                    "Catalog file not found: {}",
                    path.display()
                )));
            }
        }

        if let Some(key) = self.resolution.properties.keys().find(|k| k.contains("${")) {
            return Err(EngineError::config(format!(
                "Property names must not contain '${{': {key}"
            )));
        }

        Ok(())
    }

    /// Catalog path, or a configuration error for commands that need one
    pub fn require_catalog(&self) -> Result<&PathBuf> {
        self.catalog_path
            .as_ref()
            .ok_or_else(|| EngineError::config("No catalog file configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::NamedTempFile;

    fn args(extra: &[&str]) -> Args {
        Args::try_parse_from(extra).unwrap()
    }

    #[test]
    fn test_from_args_collects_properties_and_defaults() {
        let catalog = NamedTempFile::new().unwrap();
        let path = catalog.path().to_str().unwrap();
        let config = Config::from_args(&args(&[
            "cmdbind", "list", "-c", path, "-P", "mode=dev", "-P", "empty=", "--default", "who=ada",
        ]))
        .unwrap();

        assert_eq!(config.catalog_path.as_deref(), Some(catalog.path()));
        assert_eq!(config.resolution.properties.get("mode").map(String::as_str), Some("dev"));
        assert_eq!(config.resolution.properties.get("empty").map(String::as_str), Some(""));
        assert_eq!(config.resolution.defaults.get("who").map(String::as_str), Some("ada"));
    }

    #[test]
    fn test_bad_property_is_config_error() {
        let catalog = NamedTempFile::new().unwrap();
        let path = catalog.path().to_str().unwrap();
        let err = Config::from_args(&args(&["cmdbind", "list", "-c", path, "-P", "novalue"])).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }

    #[test]
    fn test_missing_catalog_is_rejected() {
        let err = Config::from_args(&args(&["cmdbind", "check", "-c", "/nonexistent/cat.json"])).unwrap_err();
        assert!(err.to_string().contains("Catalog file not found"));
    }

    #[test]
    fn test_tokenize_needs_no_catalog() {
        let config = Config::from_args(&args(&["cmdbind", "tokenize", "a b"])).unwrap();
        assert!(config.catalog_path.is_none());
        assert!(config.require_catalog().is_err());
    }
}
