//! Signature verification for the forwarder system.
//!
//! Recovery of a signer address from a typed-data signature sits behind the
//! [`SignatureVerifier`] trait so the registry logic can run against real
//! secp256k1 signatures or against synthetic signatures in tests.

use alloy_primitives::{Address, B256};
use forwarder_types::{ConfigSchema, Eip712Error, ImplementationRegistry, TypedMessage};
use thiserror::Error;

pub mod implementations {
	pub mod ecdsa;
	#[cfg(any(test, feature = "testing"))]
	pub mod mock;
}

/// Errors that can occur while verifying a signature.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifierError {
	/// Signature bytes have the wrong length or an invalid recovery id.
	#[error("Invalid signature format: {0}")]
	InvalidSignatureFormat(String),
	/// Signature parses but does not recover to a usable address.
	#[error("Malformed signature: {0}")]
	MalformedSignature(String),
	/// Typed message values do not match the schema.
	#[error("Invalid typed data: {0}")]
	TypedData(#[from] Eip712Error),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Recovers signer addresses from signatures over a digest.
pub trait SignatureVerifier: Send + Sync {
	/// Recovers the address that produced `signature` over `digest`.
	///
	/// A signature made by a different key, or over a different digest,
	/// recovers to some other address; that is not an error.
	fn recover(&self, digest: &B256, signature: &[u8]) -> Result<Address, VerifierError>;

	/// Stable identifier of a signature, independent of its byte encoding.
	///
	/// Two encodings of the same signature produce the same id.
	fn signature_id(&self, signature: &[u8]) -> Result<B256, VerifierError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Signature of the factory every verifier implementation provides.
pub type VerifierFactory = fn(&toml::Value) -> Result<Box<dyn SignatureVerifier>, VerifierError>;

/// Registry trait for verifier implementations.
pub trait VerifierRegistry: ImplementationRegistry<Factory = VerifierFactory> {}

/// Returns `(name, factory)` for every verifier implementation.
pub fn get_all_implementations() -> Vec<(&'static str, VerifierFactory)> {
	use implementations::ecdsa;

	#[allow(unused_mut)]
	let mut registered = vec![(ecdsa::Registry::NAME, ecdsa::Registry::factory())];
	#[cfg(any(test, feature = "testing"))]
	registered.push((
		implementations::mock::Registry::NAME,
		implementations::mock::Registry::factory(),
	));
	registered
}

/// Service wrapping the configured verifier backend.
pub struct VerifierService {
	implementation: Box<dyn SignatureVerifier>,
}

impl VerifierService {
	pub fn new(implementation: Box<dyn SignatureVerifier>) -> Self {
		Self { implementation }
	}

	pub fn recover(&self, digest: &B256, signature: &[u8]) -> Result<Address, VerifierError> {
		self.implementation.recover(digest, signature)
	}

	pub fn signature_id(&self, signature: &[u8]) -> Result<B256, VerifierError> {
		self.implementation.signature_id(signature)
	}

	/// Returns whether `signature` over `digest` was produced by `expected`.
	pub fn verify_digest(
		&self,
		digest: &B256,
		signature: &[u8],
		expected: Address,
	) -> Result<bool, VerifierError> {
		let recovered = self.recover(digest, signature)?;
		if recovered != expected {
			tracing::debug!(
				expected = %expected,
				recovered = %recovered,
				"Signature recovered to a different address"
			);
		}
		Ok(recovered == expected)
	}

	/// Returns whether `signature` over the typed `message` was produced by `expected`.
	pub fn verify(
		&self,
		message: &TypedMessage,
		signature: &[u8],
		expected: Address,
	) -> Result<bool, VerifierError> {
		let digest = message.signing_hash()?;
		self.verify_digest(&digest, signature, expected)
	}
}
