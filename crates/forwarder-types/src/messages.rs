//! Signed approval messages.
//!
//! `ApproveForwarder` is verified by the forwarder registry and carries a
//! nonce. `ApproveForwarderForever` is verified by the universal forwarder
//! and has no nonce: a signature over it stays valid for as long as it
//! exists.

use crate::eip712::{
	compute_final_digest, encode_struct, Eip712Domain, FieldType, FieldValue, TypeField,
	TypedMessage, TypedSchema,
};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Signing domain name of the forwarder registry.
pub const REGISTRY_DOMAIN_NAME: &str = "ForwarderRegistry";
/// Signing domain name of the universal forwarder.
pub const UNIVERSAL_DOMAIN_NAME: &str = "UniversalForwarder";

pub const APPROVE_FORWARDER_TYPE: &str =
	"ApproveForwarder(address signer,address forwarder,bool approved,uint256 nonce)";
pub const APPROVE_FORWARDER_FOREVER_TYPE: &str =
	"ApproveForwarderForever(address signer,address forwarder)";

/// Registry approval, grant or revocation, at a given signer nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveForwarder {
	pub signer: Address,
	pub forwarder: Address,
	pub approved: bool,
	pub nonce: U256,
}

impl ApproveForwarder {
	pub fn schema() -> TypedSchema {
		TypedSchema::new(
			"ApproveForwarder",
			vec![
				TypeField::new("signer", FieldType::Address),
				TypeField::new("forwarder", FieldType::Address),
				TypeField::new("approved", FieldType::Bool),
				TypeField::new("nonce", FieldType::Uint256),
			],
		)
	}

	pub fn values(&self) -> Vec<FieldValue> {
		vec![
			FieldValue::Address(self.signer),
			FieldValue::Address(self.forwarder),
			FieldValue::Bool(self.approved),
			FieldValue::Uint256(self.nonce),
		]
	}

	pub fn struct_hash(&self) -> B256 {
		encode_struct(&Self::schema().type_hash(), &self.values())
	}

	/// Digest the signer signs under `domain`.
	pub fn signing_hash(&self, domain: &Eip712Domain) -> B256 {
		compute_final_digest(&domain.separator(), &self.struct_hash())
	}

	pub fn to_typed_message(&self, domain: &Eip712Domain) -> TypedMessage {
		TypedMessage {
			domain: domain.clone(),
			schema: Self::schema(),
			values: self.values(),
		}
	}
}

/// Universal forwarder grant. Has no nonce and cannot be revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveForwarderForever {
	pub signer: Address,
	pub forwarder: Address,
}

impl ApproveForwarderForever {
	pub fn schema() -> TypedSchema {
		TypedSchema::new(
			"ApproveForwarderForever",
			vec![
				TypeField::new("signer", FieldType::Address),
				TypeField::new("forwarder", FieldType::Address),
			],
		)
	}

	pub fn values(&self) -> Vec<FieldValue> {
		vec![
			FieldValue::Address(self.signer),
			FieldValue::Address(self.forwarder),
		]
	}

	pub fn struct_hash(&self) -> B256 {
		encode_struct(&Self::schema().type_hash(), &self.values())
	}

	pub fn signing_hash(&self, domain: &Eip712Domain) -> B256 {
		compute_final_digest(&domain.separator(), &self.struct_hash())
	}

	pub fn to_typed_message(&self, domain: &Eip712Domain) -> TypedMessage {
		TypedMessage {
			domain: domain.clone(),
			schema: Self::schema(),
			values: self.values(),
		}
	}
}
