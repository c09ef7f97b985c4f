//! Core of the forwarder registry system.
//!
//! Holds the forwarding registry (signed approvals, per-signer nonces and
//! call dispatch), the stateless universal forwarder, and the receiver-side
//! helper that recovers the originating signer from forwarded call data.

use forwarder_storage::StorageError;
use forwarder_types::{Address, Bytes, U256};
use forwarder_verifier::VerifierError;
use thiserror::Error;

pub mod approval;
pub mod builder;
pub mod dispatch;
pub mod nonce;
pub mod receiver;
pub mod registry;
pub mod universal;

pub use approval::ApprovalStore;
pub use builder::{BuilderError, ForwarderBuilder, ForwarderFactories, ForwarderSystem};
pub use dispatch::{CallDispatcher, CallReceiver, DispatchError, LocalHost};
pub use nonce::NonceLedger;
pub use receiver::{ForwarderTrust, TrustedForwarderContext, UniversalForwardingContext};
pub use registry::ForwarderRegistry;
pub use universal::{deterministic_address, UniversalForwarder, DETERMINISTIC_DEPLOYER};

/// Errors returned by forwarder operations.
///
/// Any error leaves registry state as it was before the operation.
#[derive(Debug, Error)]
pub enum ForwarderError {
	#[error("Invalid signature format: {0}")]
	InvalidSignatureFormat(String),
	#[error("Malformed signature: {0}")]
	MalformedSignature(String),
	#[error("Signature recovered to {recovered}, expected {expected}")]
	SignatureMismatch { expected: Address, recovered: Address },
	#[error("Nonce {nonce} of {signer} has already been used")]
	ReplayRejected { signer: Address, nonce: U256 },
	#[error("Forwarder {forwarder} is not approved by {signer}")]
	ApprovalNotGranted { signer: Address, forwarder: Address },
	/// Revert data of the forwarded call, unchanged.
	#[error("Forwarded call failed: {0}")]
	ForwardedCallFailed(Bytes),
	#[error("Invalid call data: {0}")]
	InvalidCallData(String),
	#[error("Nonce space exhausted for {0}")]
	NonceExhausted(Address),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<VerifierError> for ForwarderError {
	fn from(err: VerifierError) -> Self {
		match err {
			VerifierError::InvalidSignatureFormat(msg) => {
				ForwarderError::InvalidSignatureFormat(msg)
			},
			VerifierError::MalformedSignature(msg) => ForwarderError::MalformedSignature(msg),
			VerifierError::TypedData(e) => ForwarderError::Configuration(e.to_string()),
			VerifierError::Configuration(msg) => ForwarderError::Configuration(msg),
		}
	}
}

#[cfg(test)]
pub(crate) mod test_utils;
