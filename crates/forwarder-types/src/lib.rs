//! Common types module for the forwarder registry system.
//!
//! This module defines the data types shared by every forwarder component:
//! typed-data (EIP-712) encoding, the signed approval messages, forward
//! requests and the call-data convention used to carry the signer identity
//! to receivers.

/// Call-data convention for appending and extracting the signer address.
pub mod calldata;
/// EIP-712 domain, schema and encoding primitives.
pub mod eip712;
/// Signed messages understood by the registry and the universal forwarder.
pub mod messages;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Forward requests, modes and call context.
pub mod request;
/// Secure string type for private keys.
pub mod secret_string;
/// Storage namespaces for persisted forwarder state.
pub mod storage;
/// Utility functions for formatting and parsing.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use alloy_primitives::{Address, Bytes, B256, U256};
pub use calldata::{append_signer, split_appended_signer, SIGNER_SUFFIX_LEN};
pub use eip712::{
	Eip712Domain, Eip712Error, FieldType, FieldValue, TypeField, TypedMessage, TypedSchema,
};
pub use messages::{
	ApproveForwarder, ApproveForwarderForever, REGISTRY_DOMAIN_NAME, UNIVERSAL_DOMAIN_NAME,
};
pub use registry::ImplementationRegistry;
pub use request::{CallContext, ForwardMode, ForwardRequest};
pub use secret_string::SecretString;
pub use storage::StorageKey;
pub use utils::{parse_address, parse_b256, truncate_id, with_0x_prefix, without_0x_prefix};
pub use validation::*;
