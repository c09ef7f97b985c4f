//! Forward requests and the explicit call context.

use crate::calldata::split_appended_signer;
use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the immediate caller of an operation.
///
/// Every mutating operation receives the caller explicitly; the forwarder
/// named in a signed approval is always the caller, never a request field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
	pub caller: Address,
}

impl CallContext {
	pub fn new(caller: Address) -> Self {
		Self { caller }
	}
}

/// Whether a verified approval outlives the call it was submitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForwardMode {
	/// Store the approval so later calls from the same forwarder need no signature.
	Persist,
	/// Use the approval for this call only.
	#[default]
	SingleUse,
}

impl ForwardMode {
	pub fn is_persist(&self) -> bool {
		matches!(self, ForwardMode::Persist)
	}
}

impl fmt::Display for ForwardMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ForwardMode::Persist => write!(f, "persist"),
			ForwardMode::SingleUse => write!(f, "single_use"),
		}
	}
}

/// A call a forwarder submits on behalf of a signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
	/// Account the call is made for.
	pub signer: Address,
	/// Typed-data signature from `signer`. Empty when relying on a stored approval.
	pub signature: Bytes,
	pub mode: ForwardMode,
	/// Contract receiving the forwarded call.
	pub target: Address,
	/// Call data for `target`, without the signer suffix.
	pub payload: Bytes,
}

impl ForwardRequest {
	pub fn new(
		signer: Address,
		signature: impl Into<Bytes>,
		mode: ForwardMode,
		target: Address,
		payload: impl Into<Bytes>,
	) -> Self {
		Self {
			signer,
			signature: signature.into(),
			mode,
			target,
			payload: payload.into(),
		}
	}

	/// Request without a signature, authorized by a stored approval.
	pub fn unsigned(signer: Address, target: Address, payload: impl Into<Bytes>) -> Self {
		Self::new(signer, Bytes::new(), ForwardMode::SingleUse, target, payload)
	}

	/// Builds a request from call data that carries the signer as its last
	/// 20 bytes. Returns `None` when the data is too short.
	pub fn from_appended_signer(
		signature: impl Into<Bytes>,
		mode: ForwardMode,
		target: Address,
		data: &[u8],
	) -> Option<Self> {
		let (payload, signer) = split_appended_signer(data)?;
		Some(Self::new(
			signer,
			signature,
			mode,
			target,
			Bytes::copy_from_slice(payload),
		))
	}

	pub fn is_signed(&self) -> bool {
		!self.signature.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::calldata::append_signer;

	#[test]
	fn test_from_appended_signer() {
		let signer = Address::repeat_byte(0x42);
		let target = Address::repeat_byte(0x07);
		let data = append_signer(b"payload", signer);

		let request =
			ForwardRequest::from_appended_signer(vec![1u8; 65], ForwardMode::Persist, target, &data)
				.unwrap();
		assert_eq!(request.signer, signer);
		assert_eq!(request.payload.as_ref(), b"payload");
		assert_eq!(request.target, target);
		assert!(request.is_signed());
	}

	#[test]
	fn test_from_appended_signer_short_data() {
		let request = ForwardRequest::from_appended_signer(
			Bytes::new(),
			ForwardMode::SingleUse,
			Address::ZERO,
			&[0u8; 4],
		);
		assert!(request.is_none());
	}

	#[test]
	fn test_unsigned_request() {
		let request = ForwardRequest::unsigned(Address::ZERO, Address::ZERO, vec![1u8]);
		assert!(!request.is_signed());
		assert_eq!(request.mode, ForwardMode::SingleUse);
	}

	#[test]
	fn test_mode_serde() {
		let json = serde_json::to_string(&ForwardMode::SingleUse).unwrap();
		assert_eq!(json, "\"single_use\"");
		let mode: ForwardMode = serde_json::from_str("\"persist\"").unwrap();
		assert!(mode.is_persist());
	}
}
