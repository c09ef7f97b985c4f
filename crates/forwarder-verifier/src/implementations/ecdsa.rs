//! secp256k1 ECDSA verifier.
//!
//! Accepts 65-byte `r || s || v` signatures with `v` in {0, 1, 27, 28}.
//! Signatures with `s` in the upper half of the curve order are rejected so
//! that each signed message has exactly one accepted encoding.

use crate::{SignatureVerifier, VerifierError, VerifierFactory, VerifierRegistry};
use alloy_primitives::{hex, keccak256, Address, PrimitiveSignature, B256, U256};
use forwarder_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};

/// Length of an `r || s || v` signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// secp256k1 curve order divided by two.
const SECP256K1_HALF_ORDER: [u8; 32] =
	hex!("7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0");

/// Verifier recovering addresses with secp256k1 public key recovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaVerifier;

impl EcdsaVerifier {
	pub fn new() -> Self {
		Self
	}

	fn parse(signature: &[u8]) -> Result<PrimitiveSignature, VerifierError> {
		if signature.len() != SIGNATURE_LENGTH {
			return Err(VerifierError::InvalidSignatureFormat(format!(
				"expected {} bytes, got {}",
				SIGNATURE_LENGTH,
				signature.len()
			)));
		}

		let y_parity = match signature[64] {
			0 | 27 => false,
			1 | 28 => true,
			v => {
				return Err(VerifierError::InvalidSignatureFormat(format!(
					"invalid recovery id {}",
					v
				)))
			},
		};

		let r = U256::from_be_slice(&signature[..32]);
		let s = U256::from_be_slice(&signature[32..64]);
		Ok(PrimitiveSignature::new(r, s, y_parity))
	}
}

impl SignatureVerifier for EcdsaVerifier {
	fn recover(&self, digest: &B256, signature: &[u8]) -> Result<Address, VerifierError> {
		let sig = Self::parse(signature)?;

		if sig.s() > U256::from_be_bytes(SECP256K1_HALF_ORDER) {
			return Err(VerifierError::MalformedSignature(
				"s value in upper half of curve order".into(),
			));
		}

		let recovered = sig
			.recover_address_from_prehash(digest)
			.map_err(|e| VerifierError::MalformedSignature(e.to_string()))?;

		if recovered == Address::ZERO {
			return Err(VerifierError::MalformedSignature(
				"recovered the zero address".into(),
			));
		}

		Ok(recovered)
	}

	fn signature_id(&self, signature: &[u8]) -> Result<B256, VerifierError> {
		Self::parse(signature)?;
		// v is excluded: r and s identify the signature once high s is rejected.
		Ok(keccak256(&signature[..64]))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EcdsaVerifierSchema)
	}
}

/// Configuration schema for EcdsaVerifier. No fields.
pub struct EcdsaVerifierSchema;

impl ConfigSchema for EcdsaVerifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create the ECDSA verifier from configuration.
pub fn create_verifier(
	config: &toml::Value,
) -> Result<Box<dyn crate::SignatureVerifier>, VerifierError> {
	EcdsaVerifierSchema
		.validate(config)
		.map_err(|e| VerifierError::Configuration(e.to_string()))?;
	Ok(Box::new(EcdsaVerifier::new()))
}

/// Registry for the ECDSA verifier.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "ecdsa";
	type Factory = VerifierFactory;

	fn factory() -> Self::Factory {
		create_verifier
	}
}

impl VerifierRegistry for Registry {}
