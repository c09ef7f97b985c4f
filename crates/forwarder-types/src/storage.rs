//! Storage namespaces for persisted forwarder state.

use std::str::FromStr;

/// Namespaces under which the registry persists its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Per-signer nonce counters.
	Nonces,
	/// (signer, forwarder) approval flags.
	Approvals,
	/// Ids of signatures that have already been consumed.
	Signatures,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Nonces => "nonces",
			StorageKey::Approvals => "approvals",
			StorageKey::Signatures => "signatures",
		}
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Nonces, Self::Approvals, Self::Signatures].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"nonces" => Ok(Self::Nonces),
			"approvals" => Ok(Self::Approvals),
			"signatures" => Ok(Self::Signatures),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
