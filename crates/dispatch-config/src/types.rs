//! Configuration types for the dispatch service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete dispatch service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Service identity and HTTP settings.
	pub service: ServiceConfig,
	/// Durable storage settings.
	pub storage: StorageConfig,
	/// Auto-assignment retry settings.
	pub assignment: AssignmentConfig,
	/// Providers provisioned on first start when the directory is empty.
	pub seed_providers: Vec<SeedProvider>,
}

/// Service identity and HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
	/// Service name used in logs.
	pub name: String,
	/// Interface the HTTP API binds to.
	pub host: String,
	/// HTTP API port.
	pub http_port: u16,
	/// Default log level.
	pub log_level: String,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			name: "dispatch".to_string(),
			host: "0.0.0.0".to_string(),
			http_port: 5000,
			log_level: "info".to_string(),
		}
	}
}

/// Durable storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
	/// Storage backend: "memory" or "file".
	pub backend: String,
	/// Base directory for the file backend.
	pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: "memory".to_string(),
			path: None,
		}
	}
}

/// Auto-assignment retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
	/// Maximum assignment attempts per dispatch.
	pub max_attempts: u32,
	/// Delay before the first retry. Doubles on each further attempt.
	pub base_delay_ms: u64,
	/// Event bus channel capacity.
	pub event_capacity: usize,
}

impl Default for AssignmentConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay_ms: 2000,
			event_capacity: 1000,
		}
	}
}

/// A provider provisioned at first start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedProvider {
	pub name: String,
	pub email: String,
	pub phone: String,
	pub capabilities: Vec<String>,
	#[serde(default = "default_rating")]
	pub rating: f64,
}

fn default_rating() -> f64 {
	5.0
}
