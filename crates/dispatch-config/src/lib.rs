//! Configuration management for the dispatch service.
//!
//! Supports TOML, JSON, and YAML configuration files, environment
//! variable overrides, and validation of the loaded configuration.

pub mod loader;
pub mod types;

pub use loader::{example_config, load_config, ConfigLoader};
pub use types::*;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	Parse(String),

	#[error("Validation error: {0}")]
	Validation(String),

	#[error("Unsupported config format: {0}")]
	UnsupportedFormat(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}
