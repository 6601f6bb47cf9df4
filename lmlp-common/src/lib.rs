//! # LMLP Common Library
//!
//! Shared code for the LMLP back-office pipeline:
//! - Error types
//! - Configuration loading (TOML + environment overrides)
//! - Text normalization used by every comparison site
//! - Logging initialization
//! - Utility functions

pub mod config;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod uuid_utils;

pub use config::{MatchingConfig, SecondaryAttribute, TomlConfig};
pub use error::{Error, Result};
pub use normalize::normalize;
