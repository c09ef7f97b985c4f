//! EIP-712 typed structured data hashing.
//!
//! These helpers provide:
//! - Domain separator computation, with or without the `version` member
//! - Struct hashing for a runtime schema of static field types
//! - Final digest computation (0x1901 || domainSeparator || structHash)

use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain type used by the forwarder contracts (no `version` member).
pub const DOMAIN_TYPE: &str = "EIP712Domain(string name,uint256 chainId,address verifyingContract)";
/// Domain type used when a `version` member is configured.
pub const DOMAIN_TYPE_WITH_VERSION: &str =
	"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Errors raised when a value record does not match its schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Eip712Error {
	/// The number of values differs from the number of schema fields.
	#[error("Expected {expected} values for {type_name}, got {actual}")]
	ArityMismatch {
		type_name: String,
		expected: usize,
		actual: usize,
	},
	/// A value does not have the type declared by its field.
	#[error("Field '{field}' expects {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: &'static str,
	},
}

/// EIP-712 domain binding a signature to one contract on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
	/// Human readable signing domain name.
	pub name: String,
	/// Optional domain version. Omitted from the type string when absent.
	pub version: Option<String>,
	/// Chain the verifying contract lives on.
	pub chain_id: u64,
	/// Address of the contract that verifies the signature.
	pub verifying_contract: Address,
}

impl Eip712Domain {
	/// Creates a domain without a version member.
	pub fn new(name: impl Into<String>, chain_id: u64, verifying_contract: Address) -> Self {
		Self {
			name: name.into(),
			version: None,
			chain_id,
			verifying_contract,
		}
	}

	/// Adds a version member to the domain.
	pub fn with_version(mut self, version: impl Into<String>) -> Self {
		self.version = Some(version.into());
		self
	}

	/// Returns the `EIP712Domain(...)` type string for this domain shape.
	pub fn type_string(&self) -> &'static str {
		if self.version.is_some() {
			DOMAIN_TYPE_WITH_VERSION
		} else {
			DOMAIN_TYPE
		}
	}

	/// Computes the domain separator.
	pub fn separator(&self) -> B256 {
		let mut enc = Eip712AbiEncoder::new();
		enc.push_b256(&keccak256(self.type_string().as_bytes()));
		enc.push_b256(&keccak256(self.name.as_bytes()));
		if let Some(version) = &self.version {
			enc.push_b256(&keccak256(version.as_bytes()));
		}
		enc.push_u256(U256::from(self.chain_id));
		enc.push_address(&self.verifying_contract);
		keccak256(enc.finish())
	}
}

/// Compute the final EIP-712 digest: keccak256(0x1901 || domainSeparator || structHash).
pub fn compute_final_digest(domain_separator: &B256, struct_hash: &B256) -> B256 {
	let mut out = Vec::with_capacity(2 + 32 + 32);
	out.push(0x19);
	out.push(0x01);
	out.extend_from_slice(domain_separator.as_slice());
	out.extend_from_slice(struct_hash.as_slice());
	keccak256(out)
}

/// Static Solidity types supported in forwarder schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
	Address,
	Bool,
	Uint256,
	Bytes32,
}

impl FieldType {
	/// Returns the Solidity spelling of the type.
	pub fn as_str(&self) -> &'static str {
		match self {
			FieldType::Address => "address",
			FieldType::Bool => "bool",
			FieldType::Uint256 => "uint256",
			FieldType::Bytes32 => "bytes32",
		}
	}
}

/// A concrete value for one schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
	Address(Address),
	Bool(bool),
	Uint256(U256),
	Bytes32(B256),
}

impl FieldValue {
	/// Returns the type this value encodes as.
	pub fn field_type(&self) -> FieldType {
		match self {
			FieldValue::Address(_) => FieldType::Address,
			FieldValue::Bool(_) => FieldType::Bool,
			FieldValue::Uint256(_) => FieldType::Uint256,
			FieldValue::Bytes32(_) => FieldType::Bytes32,
		}
	}
}

/// One `{name, type}` entry of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeField {
	pub name: String,
	pub field_type: FieldType,
}

impl TypeField {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
		}
	}
}

/// Ordered schema of a primary struct type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedSchema {
	/// Struct name, e.g. `ApproveForwarder`.
	pub name: String,
	/// Fields in declaration order.
	pub fields: Vec<TypeField>,
}

impl TypedSchema {
	pub fn new(name: impl Into<String>, fields: Vec<TypeField>) -> Self {
		Self {
			name: name.into(),
			fields,
		}
	}

	/// Encodes the schema as `Name(type1 name1,type2 name2)`.
	pub fn type_string(&self) -> String {
		let members = self
			.fields
			.iter()
			.map(|f| format!("{} {}", f.field_type.as_str(), f.name))
			.collect::<Vec<_>>()
			.join(",");
		format!("{}({})", self.name, members)
	}

	pub fn type_hash(&self) -> B256 {
		keccak256(self.type_string().as_bytes())
	}

	/// Computes `hashStruct` for a value record matching this schema.
	pub fn struct_hash(&self, values: &[FieldValue]) -> Result<B256, Eip712Error> {
		if values.len() != self.fields.len() {
			return Err(Eip712Error::ArityMismatch {
				type_name: self.name.clone(),
				expected: self.fields.len(),
				actual: values.len(),
			});
		}

		for (field, value) in self.fields.iter().zip(values) {
			if field.field_type != value.field_type() {
				return Err(Eip712Error::TypeMismatch {
					field: field.name.clone(),
					expected: field.field_type.as_str(),
					actual: value.field_type().as_str(),
				});
			}
		}
		Ok(encode_struct(&self.type_hash(), values))
	}
}

/// `keccak256(typeHash || enc(v1) || ... || enc(vn))` over values already
/// known to match their type.
pub(crate) fn encode_struct(type_hash: &B256, values: &[FieldValue]) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(type_hash);
	for value in values {
		enc.push_value(value);
	}
	keccak256(enc.finish())
}

/// A complete typed-data payload: domain, schema and values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedMessage {
	pub domain: Eip712Domain,
	pub schema: TypedSchema,
	pub values: Vec<FieldValue>,
}

impl TypedMessage {
	/// Computes the digest a signer signs for this message.
	pub fn signing_hash(&self) -> Result<B256, Eip712Error> {
		let struct_hash = self.schema.struct_hash(&self.values)?;
		Ok(compute_final_digest(&self.domain.separator(), &struct_hash))
	}
}

/// Minimal ABI encoder for static types used in EIP-712 struct hashing.
pub struct Eip712AbiEncoder {
	buf: Vec<u8>,
}

impl Default for Eip712AbiEncoder {
	fn default() -> Self {
		Self::new()
	}
}

impl Eip712AbiEncoder {
	pub fn new() -> Self {
		Self { buf: Vec::new() }
	}

	pub fn push_b256(&mut self, v: &B256) {
		self.buf.extend_from_slice(v.as_slice());
	}

	pub fn push_address(&mut self, addr: &Address) {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(addr.as_slice());
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u256(&mut self, v: U256) {
		let word: [u8; 32] = v.to_be_bytes::<32>();
		self.buf.extend_from_slice(&word);
	}

	pub fn push_bool(&mut self, v: bool) {
		let mut word = [0u8; 32];
		word[31] = v as u8;
		self.buf.extend_from_slice(&word);
	}

	pub fn push_value(&mut self, value: &FieldValue) {
		match value {
			FieldValue::Address(a) => self.push_address(a),
			FieldValue::Bool(b) => self.push_bool(*b),
			FieldValue::Uint256(u) => self.push_u256(*u),
			FieldValue::Bytes32(b) => self.push_b256(b),
		}
	}

	pub fn finish(self) -> Vec<u8> {
		self.buf
	}
}
