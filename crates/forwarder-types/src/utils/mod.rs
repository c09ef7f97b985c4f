//! Utility functions for parsing and formatting values.

pub mod formatting;

pub use formatting::{truncate_id, with_0x_prefix, without_0x_prefix};

use alloy_primitives::{Address, B256};

/// Parses a hex address, with or without the `0x` prefix.
pub fn parse_address(value: &str) -> Result<Address, String> {
	with_0x_prefix(value.trim())
		.parse::<Address>()
		.map_err(|e| format!("Invalid address '{}': {}", value, e))
}

/// Parses a 32-byte hex value, with or without the `0x` prefix.
pub fn parse_b256(value: &str) -> Result<B256, String> {
	with_0x_prefix(value.trim())
		.parse::<B256>()
		.map_err(|e| format!("Invalid bytes32 '{}': {}", value, e))
}
