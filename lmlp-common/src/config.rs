//! Configuration loading and matching policy resolution
//!
//! Resolution priority follows ENV → TOML → compiled default. The matching
//! thresholds live here rather than as hard-coded constants because they were
//! tuned reactively against observed false positives and need to stay
//! adjustable without a rebuild.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Secondary attribute consulted by the fuzzy matching phase.
///
/// The authoritative attribute wins ties among fuzzy candidates; the other
/// one is still accepted as corroboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecondaryAttribute {
    /// Author name is the higher-trust corroborating attribute
    #[default]
    Author,
    /// Publisher string is the higher-trust corroborating attribute
    Publisher,
}

/// Matching policy for the resolution phase chain
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum Jaro-Winkler similarity on title keys for a fuzzy candidate
    pub title_threshold: f64,
    /// Minimum similarity for a secondary attribute to corroborate a fuzzy hit
    pub secondary_threshold: f64,
    /// Which secondary attribute wins fuzzy tie-breaks
    pub authoritative_secondary: SecondaryAttribute,
    /// Minimum normalized title length for the containment phase
    pub min_containment_chars: usize,
    /// Minimum verifier confidence before a canonical publisher is corrected
    pub publisher_correction_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            title_threshold: 0.85,
            secondary_threshold: 0.80,
            authoritative_secondary: SecondaryAttribute::Author,
            min_containment_chars: 5,
            publisher_correction_threshold: 0.90,
        }
    }
}

/// TOML configuration file contents
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    pub database_path: Option<PathBuf>,
    /// Matching policy section
    pub matching: MatchingConfig,
}

impl TomlConfig {
    /// Load configuration.
    ///
    /// Priority order:
    /// 1. Explicit path argument
    /// 2. `LMLP_CONFIG` environment variable
    /// 3. Compiled defaults (missing file is not an error)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = path
            .map(PathBuf::from)
            .or_else(|| std::env::var("LMLP_CONFIG").ok().map(PathBuf::from));

        let mut config = match resolved {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(&p)
                    .map_err(|e| Error::Config(format!("Read config failed: {}", e)))?;
                let parsed: TomlConfig = toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Parse config failed: {}", e)))?;
                info!(path = %p.display(), "Configuration loaded from TOML");
                parsed
            }
            Some(p) => {
                warn!(path = %p.display(), "Config file not found, using defaults");
                TomlConfig::default()
            }
            None => TomlConfig::default(),
        };

        config.apply_env_overrides()?;
        config.matching.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of TOML values.
    ///
    /// Recognized variables: `LMLP_TITLE_THRESHOLD`, `LMLP_SECONDARY_THRESHOLD`,
    /// `LMLP_AUTHORITATIVE_SECONDARY` (`author`|`publisher`), `LMLP_DATABASE_PATH`.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("LMLP_TITLE_THRESHOLD") {
            self.matching.title_threshold = v
                .parse()
                .map_err(|_| Error::Config(format!("Invalid LMLP_TITLE_THRESHOLD: {}", v)))?;
        }
        if let Ok(v) = std::env::var("LMLP_SECONDARY_THRESHOLD") {
            self.matching.secondary_threshold = v
                .parse()
                .map_err(|_| Error::Config(format!("Invalid LMLP_SECONDARY_THRESHOLD: {}", v)))?;
        }
        if let Ok(v) = std::env::var("LMLP_AUTHORITATIVE_SECONDARY") {
            self.matching.authoritative_secondary = match v.to_lowercase().as_str() {
                "author" => SecondaryAttribute::Author,
                "publisher" => SecondaryAttribute::Publisher,
                other => {
                    return Err(Error::Config(format!(
                        "Invalid LMLP_AUTHORITATIVE_SECONDARY: {} (expected author|publisher)",
                        other
                    )))
                }
            };
        }
        if let Ok(v) = std::env::var("LMLP_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(v));
        }
        Ok(())
    }
}

impl MatchingConfig {
    /// Validate threshold ranges
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("title_threshold", self.title_threshold),
            ("secondary_threshold", self.secondary_threshold),
            ("publisher_correction_threshold", self.publisher_correction_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within 0.0..=1.0 (got {})",
                    name, value
                )));
            }
        }
        if self.min_containment_chars == 0 {
            return Err(Error::Config(
                "min_containment_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
