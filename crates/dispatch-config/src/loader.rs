//! Configuration loading from files and environment.

use crate::{
	types::{Config, SeedProvider, StorageConfig},
	ConfigError,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
	/// Loads configuration from a file, picking the parser by extension.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
		let path = path.as_ref();
		info!("Loading configuration from {:?}", path);

		if !path.exists() {
			return Err(ConfigError::FileNotFound(path.display().to_string()));
		}

		let contents = std::fs::read_to_string(path)?;

		let config = match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Self::from_toml(&contents)?,
			Some("json") => Self::from_json(&contents)?,
			Some("yaml") | Some("yml") => Self::from_yaml(&contents)?,
			_ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
		};

		Self::validate_config(&config)?;
		Ok(config)
	}

	/// Parses configuration from a TOML string.
	pub fn from_toml(contents: &str) -> Result<Config, ConfigError> {
		toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
	}

	/// Parses configuration from a JSON string.
	pub fn from_json(contents: &str) -> Result<Config, ConfigError> {
		serde_json::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
	}

	/// Parses configuration from a YAML string.
	pub fn from_yaml(contents: &str) -> Result<Config, ConfigError> {
		serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
	}

	/// Loads configuration from a file (when given) with environment
	/// overrides applied, falling back to defaults otherwise.
	pub fn from_env_and_file(file_path: Option<&Path>) -> Result<Config, ConfigError> {
		let mut config = match file_path {
			Some(path) => Self::from_file(path)?,
			None => Config::default(),
		};

		Self::apply_env_overrides(&mut config)?;
		Self::validate_config(&config)?;
		Ok(config)
	}

	fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(port) = std::env::var("DISPATCH_HTTP_PORT") {
			debug!("Overriding HTTP port from environment");
			config.service.http_port = port.parse().map_err(|e| {
				ConfigError::Validation(format!("Invalid DISPATCH_HTTP_PORT: {}", e))
			})?;
		}

		if let Ok(level) = std::env::var("DISPATCH_LOG_LEVEL") {
			config.service.log_level = level;
		}

		if let Ok(path) = std::env::var("DISPATCH_STORAGE_PATH") {
			config.storage.path = Some(PathBuf::from(path));
		}

		Ok(())
	}

	/// Validates the loaded configuration.
	pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
		if config.service.http_port == 0 {
			return Err(ConfigError::Validation(
				"service.http_port must be nonzero".to_string(),
			));
		}

		if config.assignment.max_attempts == 0 {
			return Err(ConfigError::Validation(
				"assignment.max_attempts must be at least 1".to_string(),
			));
		}

		if config.assignment.event_capacity == 0 {
			return Err(ConfigError::Validation(
				"assignment.event_capacity must be nonzero".to_string(),
			));
		}

		match config.storage.backend.as_str() {
			"memory" => {}
			"file" => {
				if config.storage.path.is_none() {
					return Err(ConfigError::Validation(
						"storage.path is required for the file backend".to_string(),
					));
				}
			}
			other => {
				return Err(ConfigError::Validation(format!(
					"Unknown storage backend: {}",
					other
				)));
			}
		}

		let mut emails = HashSet::new();
		for seed in &config.seed_providers {
			if !emails.insert(seed.email.to_ascii_lowercase()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate seed provider email: {}",
					seed.email
				)));
			}
		}

		Ok(())
	}
}

/// Loads configuration from standard locations.
///
/// Checks `DISPATCH_CONFIG_FILE`, then `./dispatch.toml`, then
/// `./config/dispatch.toml`, then `/etc/dispatch/config.toml`, and
/// falls back to built-in defaults plus environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
	if let Ok(path) = std::env::var("DISPATCH_CONFIG_FILE") {
		return ConfigLoader::from_env_and_file(Some(Path::new(&path)));
	}

	let candidates = [
		"./dispatch.toml",
		"./config/dispatch.toml",
		"/etc/dispatch/config.toml",
	];
	for candidate in &candidates {
		if Path::new(candidate).exists() {
			return ConfigLoader::from_env_and_file(Some(Path::new(candidate)));
		}
	}

	ConfigLoader::from_env_and_file(None)
}

/// Builds the example configuration written by `generate-config`.
pub fn example_config() -> Config {
	let mut config = Config {
		storage: StorageConfig {
			backend: "file".to_string(),
			path: Some(PathBuf::from("./data/dispatch")),
		},
		..Config::default()
	};
	config.seed_providers = vec![
		SeedProvider {
			name: "John Smith".to_string(),
			email: "john@example.com".to_string(),
			phone: "+1-555-0101".to_string(),
			capabilities: vec!["plumbing".to_string(), "electrical".to_string()],
			rating: 5.0,
		},
		SeedProvider {
			name: "Sarah Johnson".to_string(),
			email: "sarah@example.com".to_string(),
			phone: "+1-555-0102".to_string(),
			capabilities: vec!["cleaning".to_string(), "painting".to_string()],
			rating: 5.0,
		},
		SeedProvider {
			name: "Mike Davis".to_string(),
			email: "mike@example.com".to_string(),
			phone: "+1-555-0103".to_string(),
			capabilities: vec!["plumbing".to_string(), "hvac".to_string()],
			rating: 5.0,
		},
		SeedProvider {
			name: "Emily Brown".to_string(),
			email: "emily@example.com".to_string(),
			phone: "+1-555-0104".to_string(),
			capabilities: vec!["cleaning".to_string(), "gardening".to_string()],
			rating: 5.0,
		},
		SeedProvider {
			name: "Robert Wilson".to_string(),
			email: "robert@example.com".to_string(),
			phone: "+1-555-0105".to_string(),
			capabilities: vec!["electrical".to_string(), "carpentry".to_string()],
			rating: 5.0,
		},
	];
	config
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_full_toml() {
		let toml = r#"
			[service]
			name = "dispatch-test"
			host = "127.0.0.1"
			http_port = 8080
			log_level = "debug"

			[storage]
			backend = "file"
			path = "/tmp/dispatch-data"

			[assignment]
			max_attempts = 5
			base_delay_ms = 100
			event_capacity = 64

			[[seed_providers]]
			name = "John Smith"
			email = "john@example.com"
			phone = "+1-555-0101"
			capabilities = ["plumbing", "electrical"]
			rating = 4.8

			[[seed_providers]]
			name = "Sarah Johnson"
			email = "sarah@example.com"
			phone = "+1-555-0102"
			capabilities = ["cleaning"]
		"#;

		let config = ConfigLoader::from_toml(toml).unwrap();
		assert_eq!(config.service.name, "dispatch-test");
		assert_eq!(config.service.http_port, 8080);
		assert_eq!(config.storage.backend, "file");
		assert_eq!(config.assignment.max_attempts, 5);
		assert_eq!(config.assignment.base_delay_ms, 100);
		assert_eq!(config.seed_providers.len(), 2);
		assert_eq!(config.seed_providers[0].rating, 4.8);
		// Rating falls back to the directory default when omitted
		assert_eq!(config.seed_providers[1].rating, 5.0);
	}

	#[test]
	fn test_defaults_cover_empty_config() {
		let config = ConfigLoader::from_toml("").unwrap();
		assert_eq!(config.service.http_port, 5000);
		assert_eq!(config.storage.backend, "memory");
		assert_eq!(config.assignment.max_attempts, 3);
		assert_eq!(config.assignment.base_delay_ms, 2000);
		assert!(config.seed_providers.is_empty());
		assert!(ConfigLoader::validate_config(&config).is_ok());
	}

	#[test]
	fn test_parse_json() {
		let json = r#"{
			"service": { "http_port": 9000 },
			"storage": { "backend": "memory" }
		}"#;

		let config = ConfigLoader::from_json(json).unwrap();
		assert_eq!(config.service.http_port, 9000);
		assert_eq!(config.service.name, "dispatch");
	}

	#[test]
	fn test_validation_rejects_zero_port() {
		let toml = r#"
			[service]
			http_port = 0
		"#;
		let config = ConfigLoader::from_toml(toml).unwrap();
		assert!(matches!(
			ConfigLoader::validate_config(&config),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_validation_rejects_zero_attempts() {
		let toml = r#"
			[assignment]
			max_attempts = 0
		"#;
		let config = ConfigLoader::from_toml(toml).unwrap();
		assert!(matches!(
			ConfigLoader::validate_config(&config),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_validation_requires_path_for_file_backend() {
		let toml = r#"
			[storage]
			backend = "file"
		"#;
		let config = ConfigLoader::from_toml(toml).unwrap();
		assert!(matches!(
			ConfigLoader::validate_config(&config),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_validation_rejects_unknown_backend() {
		let toml = r#"
			[storage]
			backend = "sqlite"
		"#;
		let config = ConfigLoader::from_toml(toml).unwrap();
		assert!(matches!(
			ConfigLoader::validate_config(&config),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_validation_rejects_duplicate_seed_emails() {
		let toml = r#"
			[[seed_providers]]
			name = "A"
			email = "same@example.com"
			phone = "1"
			capabilities = ["plumbing"]

			[[seed_providers]]
			name = "B"
			email = "Same@Example.com"
			phone = "2"
			capabilities = ["hvac"]
		"#;
		let config = ConfigLoader::from_toml(toml).unwrap();
		assert!(matches!(
			ConfigLoader::validate_config(&config),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_example_config_is_valid_and_serializable() {
		let config = example_config();
		ConfigLoader::validate_config(&config).unwrap();

		let serialized = toml::to_string_pretty(&config).unwrap();
		let reparsed = ConfigLoader::from_toml(&serialized).unwrap();
		assert_eq!(reparsed.seed_providers.len(), 5);
		assert_eq!(reparsed.storage.backend, "file");
	}

	#[test]
	fn test_unsupported_extension_is_rejected() {
		let dir = std::env::temp_dir().join("dispatch-config-test");
		std::fs::create_dir_all(&dir).unwrap();
		let path = dir.join("config.ini");
		std::fs::write(&path, "service").unwrap();

		assert!(matches!(
			ConfigLoader::from_file(&path),
			Err(ConfigError::UnsupportedFormat(_))
		));
	}
}
