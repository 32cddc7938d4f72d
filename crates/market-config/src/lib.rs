// market-config/src/lib.rs

use regex::Regex;
use std::env;
use std::path::Path;
use thiserror::Error;

pub mod types;

pub use types::{AuthConfig, BackendConfig, FeedConfig, MarketConfig, ServiceConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "MARKET_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<MarketConfig, ConfigError> {
		let mut config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		// Apply environment variable overrides
		self.apply_env_overrides(&mut config)?;

		// Validate configuration
		self.validate_config(&config)?;

		Ok(config)
	}

	/// Parses a configuration from an in-memory TOML string, with the
	/// same substitution, overrides and validation as `load`.
	pub fn load_from_str(&self, content: &str) -> Result<MarketConfig, ConfigError> {
		let substituted = self.substitute_env_vars(content)?;
		let mut config: MarketConfig =
			toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?;
		self.apply_env_overrides(&mut config)?;
		self.validate_config(&config)?;
		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<MarketConfig, ConfigError> {
		let content = tokio::fs::read_to_string(file_path).await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				ConfigError::FileNotFound(file_path.to_string())
			} else {
				ConfigError::IoError(e)
			}
		})?;

		// Substitute environment variables
		let substituted_content = self.substitute_env_vars(&content)?;

		// Parse TOML
		let config: MarketConfig = toml::from_str(&substituted_content)
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		// Find and replace ${VAR_NAME} patterns
		let re = Regex::new(r"\$\{([^}]+)\}").expect("valid substitution pattern");

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut MarketConfig) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.service.log_level = log_level;
		}

		if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
			config.service.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		if let Ok(batch_size) = env::var(format!("{}FEED_BATCH_SIZE", self.env_prefix)) {
			config.feed.batch_size = batch_size
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid batch size: {}", e)))?;
		}

		Ok(())
	}

	fn validate_config(&self, config: &MarketConfig) -> Result<(), ConfigError> {
		if config.auth.secret.trim().is_empty() {
			return Err(ConfigError::ValidationError(
				"auth.secret must not be empty".to_string(),
			));
		}

		if config.auth.max_age_seconds == 0 {
			return Err(ConfigError::ValidationError(
				"auth.max_age_seconds must be positive".to_string(),
			));
		}

		if config.storage.backend.trim().is_empty() {
			return Err(ConfigError::ValidationError(
				"storage.backend must not be empty".to_string(),
			));
		}

		if config.feed.batch_size == 0 {
			return Err(ConfigError::ValidationError(
				"feed.batch_size must be positive".to_string(),
			));
		}

		Ok(())
	}
}
