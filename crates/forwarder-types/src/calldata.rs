//! Call-data convention for forwarded calls.
//!
//! A forwarder delivers `payload || signer` to the target, where `signer` is
//! the 20-byte big-endian address of the account the call is made for.

use alloy_primitives::{Address, Bytes};

/// Length of the signer suffix appended to forwarded call data.
pub const SIGNER_SUFFIX_LEN: usize = 20;

/// Appends `signer` to `payload`.
pub fn append_signer(payload: &[u8], signer: Address) -> Bytes {
	let mut data = Vec::with_capacity(payload.len() + SIGNER_SUFFIX_LEN);
	data.extend_from_slice(payload);
	data.extend_from_slice(signer.as_slice());
	data.into()
}

/// Splits call data into `(payload, signer)`.
///
/// Returns `None` when the data is shorter than the suffix.
pub fn split_appended_signer(data: &[u8]) -> Option<(&[u8], Address)> {
	let split = data.len().checked_sub(SIGNER_SUFFIX_LEN)?;
	let (payload, suffix) = data.split_at(split);
	Some((payload, Address::from_slice(suffix)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_append_then_split() {
		let signer = Address::repeat_byte(0xab);
		let data = append_signer(&[1, 2, 3], signer);
		assert_eq!(data.len(), 23);

		let (payload, recovered) = split_appended_signer(&data).unwrap();
		assert_eq!(payload, &[1, 2, 3]);
		assert_eq!(recovered, signer);
	}

	#[test]
	fn test_empty_payload() {
		let signer = Address::repeat_byte(0x01);
		let data = append_signer(&[], signer);
		let (payload, recovered) = split_appended_signer(&data).unwrap();
		assert!(payload.is_empty());
		assert_eq!(recovered, signer);
	}

	#[test]
	fn test_short_data() {
		assert!(split_appended_signer(&[0u8; 19]).is_none());
	}
}
