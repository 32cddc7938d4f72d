//! Configuration types.

use serde::Deserialize;
use std::fmt;

/// Top-level service configuration, loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
	pub service: ServiceConfig,
	pub auth: AuthConfig,
	pub storage: BackendConfig,
	#[serde(default)]
	pub notifier: BackendConfig,
	#[serde(default)]
	pub feed: FeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
	#[serde(default = "default_service_name")]
	pub name: String,
	#[serde(default = "default_http_port")]
	pub http_port: u16,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

/// Authentication settings.
///
/// The secret is only ever handed to the payload verifier; it is kept
/// out of `Debug` output so configuration dumps cannot leak it.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
	pub secret: String,
	#[serde(default = "default_max_age_seconds")]
	pub max_age_seconds: u64,
}

impl fmt::Debug for AuthConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AuthConfig")
			.field("secret", &"<redacted>")
			.field("max_age_seconds", &self.max_age_seconds)
			.finish()
	}
}

/// Selects a pluggable backend by name, with a backend-specific table
/// passed through to its factory untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
	pub backend: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

impl Default for BackendConfig {
	fn default() -> Self {
		Self {
			backend: "log".to_string(),
			config: empty_table(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,
}

impl Default for FeedConfig {
	fn default() -> Self {
		Self {
			batch_size: default_batch_size(),
		}
	}
}

fn default_service_name() -> String {
	"market-service".to_string()
}

fn default_http_port() -> u16 {
	8080
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_max_age_seconds() -> u64 {
	24 * 60 * 60
}

fn default_batch_size() -> usize {
	10
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::Table::new())
}
