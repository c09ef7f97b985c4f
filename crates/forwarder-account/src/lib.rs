//! Account management for signers.
//!
//! This module is the off-chain half of the protocol: it holds a signer's
//! key and produces the typed-data signatures that the registry and the
//! universal forwarder verify.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use forwarder_types::{
	ApproveForwarder, ApproveForwarderForever, ConfigSchema, Eip712Domain, ImplementationRegistry,
	TypedMessage,
};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Interface for account implementations.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Retrieves the address associated with this account.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a 32-byte digest, returning a 65-byte `r || s || v` signature.
	async fn sign_hash(&self, hash: &B256) -> Result<Bytes, AccountError>;
}

/// Signature of the factory every account implementation provides.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Returns `(name, factory)` for every account implementation.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service producing forwarder signatures with the managed account.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	pub async fn sign_digest(&self, digest: &B256) -> Result<Bytes, AccountError> {
		self.implementation.sign_hash(digest).await
	}

	/// Signs an arbitrary typed message.
	pub async fn sign_typed(&self, message: &TypedMessage) -> Result<Bytes, AccountError> {
		let digest = message
			.signing_hash()
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		self.sign_digest(&digest).await
	}

	/// Signs a registry approval (grant or revocation) for `forwarder` at `nonce`.
	///
	/// The signer field is always this account's address.
	pub async fn sign_approval(
		&self,
		domain: &Eip712Domain,
		forwarder: Address,
		approved: bool,
		nonce: alloy_primitives::U256,
	) -> Result<Bytes, AccountError> {
		let message = ApproveForwarder {
			signer: self.get_address().await?,
			forwarder,
			approved,
			nonce,
		};
		self.sign_digest(&message.signing_hash(domain)).await
	}

	/// Signs a universal forwarder grant for `forwarder`.
	///
	/// The resulting signature authorizes `forwarder` for as long as it
	/// exists; it cannot be revoked.
	pub async fn sign_forever_grant(
		&self,
		domain: &Eip712Domain,
		forwarder: Address,
	) -> Result<Bytes, AccountError> {
		let grant = ApproveForwarderForever {
			signer: self.get_address().await?,
			forwarder,
		};
		self.sign_digest(&grant.signing_hash(domain)).await
	}
}
