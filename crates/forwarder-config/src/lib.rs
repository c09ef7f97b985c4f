//! Configuration module for the forwarder registry system.
//!
//! Configuration is read from TOML. Values may reference environment
//! variables with `${VAR}` or `${VAR:-default}`.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["storage.toml", "verifier.toml"]` to include other files
//! - Each top-level section must be unique across all files

mod loader;

use forwarder_types::{parse_address, parse_b256, Address, B256};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, not the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Chain and contract identity of the forwarders.
	pub forwarder: ForwarderConfig,
	/// Backend holding nonces, approvals and consumed signatures.
	pub storage: StorageConfig,
	/// Signature recovery backend.
	pub verifier: VerifierConfig,
}

/// Identity of the registry and the universal forwarder.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwarderConfig {
	/// Chain id bound into every typed-data domain.
	pub chain_id: u64,
	/// Address of the forwarding registry.
	pub registry_address: String,
	/// Where the universal forwarder lives.
	pub universal: UniversalConfig,
}

/// Universal forwarder placement. Exactly one field must be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UniversalConfig {
	/// Explicit address.
	pub address: Option<String>,
	/// Init code hash, for an address derived by deterministic deployment.
	pub init_code_hash: Option<String>,
}

/// How the universal forwarder address is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniversalPlacement {
	Address(Address),
	Deterministic { init_code_hash: B256 },
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the signature verifier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifierConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of VAR_NAME, or with `default` for
/// `${VAR_NAME:-default}` when the variable is unset.
///
/// Input is limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut resolved = String::with_capacity(input.len());
	let mut last = 0;

	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};

		let value = match std::env::var(name.as_str()) {
			Ok(value) => value,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						name.as_str()
					)));
				},
			},
		};

		resolved.push_str(&input[last..whole.start()]);
		resolved.push_str(&value);
		last = whole.end();
	}
	resolved.push_str(&input[last..]);

	Ok(resolved)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Parsed registry address.
	pub fn registry_address(&self) -> Result<Address, ConfigError> {
		parse_address(&self.forwarder.registry_address).map_err(|e| {
			ConfigError::Validation(format!("forwarder.registry_address: {}", e))
		})
	}

	/// Parsed universal forwarder placement.
	pub fn universal_placement(&self) -> Result<UniversalPlacement, ConfigError> {
		let universal = &self.forwarder.universal;
		match (&universal.address, &universal.init_code_hash) {
			(Some(address), None) => parse_address(address)
				.map(UniversalPlacement::Address)
				.map_err(|e| {
					ConfigError::Validation(format!("forwarder.universal.address: {}", e))
				}),
			(None, Some(hash)) => parse_b256(hash)
				.map(|init_code_hash| UniversalPlacement::Deterministic { init_code_hash })
				.map_err(|e| {
					ConfigError::Validation(format!("forwarder.universal.init_code_hash: {}", e))
				}),
			_ => Err(ConfigError::Validation(
				"forwarder.universal requires exactly one of 'address' or 'init_code_hash'".into(),
			)),
		}
	}

	/// Validates the configuration:
	/// - chain id is non-zero
	/// - addresses and hashes parse
	/// - storage and verifier name a configured primary implementation
	fn validate(&self) -> Result<(), ConfigError> {
		if self.forwarder.chain_id == 0 {
			return Err(ConfigError::Validation("Chain ID cannot be zero".into()));
		}
		self.registry_address()?;
		self.universal_placement()?;

		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		validate_primary("verifier", &self.verifier.primary, &self.verifier.implementations)?;

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a TOML string, resolving environment variables and validating
/// the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
