//! Synthetic verifier for tests.
//!
//! A mock signature is `signer (20) || digest (32) || zero padding (13)`.
//! It recovers to `signer` when checked against the digest it embeds and to
//! an unrelated address otherwise, mirroring how ECDSA recovery behaves for
//! a signature over a different message.

use crate::{SignatureVerifier, VerifierError, VerifierFactory, VerifierRegistry};
use alloy_primitives::{keccak256, Address, Bytes, B256};
use forwarder_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};

const MOCK_SIGNATURE_LENGTH: usize = 65;

#[derive(Debug, Clone, Copy, Default)]
pub struct MockVerifier;

impl MockVerifier {
	/// Produces a mock signature by `signer` over `digest`.
	pub fn sign(signer: Address, digest: &B256) -> Bytes {
		let mut signature = vec![0u8; MOCK_SIGNATURE_LENGTH];
		signature[..20].copy_from_slice(signer.as_slice());
		signature[20..52].copy_from_slice(digest.as_slice());
		signature.into()
	}
}

impl SignatureVerifier for MockVerifier {
	fn recover(&self, digest: &B256, signature: &[u8]) -> Result<Address, VerifierError> {
		if signature.len() != MOCK_SIGNATURE_LENGTH {
			return Err(VerifierError::InvalidSignatureFormat(format!(
				"expected {} bytes, got {}",
				MOCK_SIGNATURE_LENGTH,
				signature.len()
			)));
		}

		let signer = Address::from_slice(&signature[..20]);
		if signer == Address::ZERO {
			return Err(VerifierError::MalformedSignature(
				"recovered the zero address".into(),
			));
		}

		if &signature[20..52] == digest.as_slice() {
			Ok(signer)
		} else {
			let mut preimage = signature.to_vec();
			preimage.extend_from_slice(digest.as_slice());
			Ok(Address::from_word(keccak256(preimage)))
		}
	}

	fn signature_id(&self, signature: &[u8]) -> Result<B256, VerifierError> {
		if signature.len() != MOCK_SIGNATURE_LENGTH {
			return Err(VerifierError::InvalidSignatureFormat(format!(
				"expected {} bytes, got {}",
				MOCK_SIGNATURE_LENGTH,
				signature.len()
			)));
		}
		Ok(keccak256(signature))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockVerifierSchema)
	}
}

pub struct MockVerifierSchema;

impl ConfigSchema for MockVerifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_verifier(
	config: &toml::Value,
) -> Result<Box<dyn SignatureVerifier>, VerifierError> {
	MockVerifierSchema
		.validate(config)
		.map_err(|e| VerifierError::Configuration(e.to_string()))?;
	Ok(Box::new(MockVerifier))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = VerifierFactory;

	fn factory() -> Self::Factory {
		create_verifier
	}
}

impl VerifierRegistry for Registry {}
