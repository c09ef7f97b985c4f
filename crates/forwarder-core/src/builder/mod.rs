//! Construction of the forwarders from configuration.
//!
//! Storage and verifier backends are created through their factories, the
//! primary of each is wrapped in its service, and both forwarders share the
//! same verifier and call dispatcher.

use crate::dispatch::CallDispatcher;
use crate::registry::ForwarderRegistry;
use crate::universal::UniversalForwarder;
use forwarder_config::{Config, UniversalPlacement};
use forwarder_storage::{StorageFactory, StorageService};
use forwarder_verifier::{VerifierFactory, VerifierService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factories available to the builder, by implementation name.
pub struct ForwarderFactories {
	pub storage_factories: HashMap<String, StorageFactory>,
	pub verifier_factories: HashMap<String, VerifierFactory>,
}

impl ForwarderFactories {
	/// Every implementation compiled into the storage and verifier crates.
	pub fn all() -> Self {
		Self {
			storage_factories: forwarder_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			verifier_factories: forwarder_verifier::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}
}

/// The forwarders built from one configuration.
pub struct ForwarderSystem {
	pub registry: Arc<ForwarderRegistry>,
	pub universal: Arc<UniversalForwarder>,
}

pub struct ForwarderBuilder {
	config: Config,
}

impl ForwarderBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn build(
		self,
		factories: ForwarderFactories,
		dispatcher: Arc<dyn CallDispatcher>,
	) -> Result<ForwarderSystem, BuilderError> {
		let storage = self.build_storage(&factories)?;
		let verifier = self.build_verifier(&factories)?;

		let chain_id = self.config.forwarder.chain_id;
		let registry_address = self
			.config
			.registry_address()
			.map_err(|e| BuilderError::Config(e.to_string()))?;
		let placement = self
			.config
			.universal_placement()
			.map_err(|e| BuilderError::Config(e.to_string()))?;

		let registry = ForwarderRegistry::new(
			chain_id,
			registry_address,
			storage,
			verifier.clone(),
			dispatcher.clone(),
		);
		let universal = match placement {
			UniversalPlacement::Address(address) => {
				UniversalForwarder::new(chain_id, address, verifier, dispatcher)
			},
			UniversalPlacement::Deterministic { init_code_hash } => {
				UniversalForwarder::deterministic(chain_id, init_code_hash, verifier, dispatcher)
			},
		};

		tracing::info!(
			chain_id,
			registry = %registry.address(),
			universal = %universal.address(),
			"Forwarders ready"
		);

		Ok(ForwarderSystem {
			registry: Arc::new(registry),
			universal: Arc::new(universal),
		})
	}

	fn build_storage(
		&self,
		factories: &ForwarderFactories,
	) -> Result<Arc<StorageService>, BuilderError> {
		let primary = &self.config.storage.primary;
		let config = self
			.config
			.storage
			.implementations
			.get(primary)
			.ok_or_else(|| BuilderError::MissingComponent(format!("storage '{}'", primary)))?;
		let factory = factories.storage_factories.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Unknown storage implementation '{}'", primary))
		})?;

		let backend = factory(config).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %primary,
				error = %e,
				"Failed to create storage implementation"
			);
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				primary, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %primary, "Loaded");

		Ok(Arc::new(StorageService::new(backend)))
	}

	fn build_verifier(
		&self,
		factories: &ForwarderFactories,
	) -> Result<Arc<VerifierService>, BuilderError> {
		let primary = &self.config.verifier.primary;
		let config = self
			.config
			.verifier
			.implementations
			.get(primary)
			.ok_or_else(|| BuilderError::MissingComponent(format!("verifier '{}'", primary)))?;
		let factory = factories.verifier_factories.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Unknown verifier implementation '{}'", primary))
		})?;

		let implementation = factory(config).map_err(|e| {
			tracing::error!(
				component = "verifier",
				implementation = %primary,
				error = %e,
				"Failed to create verifier implementation"
			);
			BuilderError::Config(format!(
				"Failed to create verifier implementation '{}': {}",
				primary, e
			))
		})?;
		tracing::info!(component = "verifier", implementation = %primary, "Loaded");

		Ok(Arc::new(VerifierService::new(implementation)))
	}
}
