//! Receiver-side recovery of the originating signer.

use forwarder_types::{split_appended_signer, Address, CallContext};

/// Trust policy of a receiver.
///
/// Calls from a trusted forwarder carry the signer in their last 20 bytes.
/// Any other caller is itself the sender and its data is used as is.
pub trait ForwarderTrust: Send + Sync {
	fn is_trusted_forwarder(&self, forwarder: Address) -> bool;

	/// Splits incoming call data into `(sender, payload)`.
	///
	/// Data from a trusted forwarder shorter than an address is treated
	/// like a direct call.
	fn split<'a>(&self, ctx: &CallContext, data: &'a [u8]) -> (Address, &'a [u8]) {
		if self.is_trusted_forwarder(ctx.caller) {
			if let Some((payload, signer)) = split_appended_signer(data) {
				return (signer, payload);
			}
		}
		(ctx.caller, data)
	}

	/// Account the call is made for.
	fn msg_sender(&self, ctx: &CallContext, data: &[u8]) -> Address {
		self.split(ctx, data).0
	}

	/// Call data without the signer suffix.
	fn msg_data<'a>(&self, ctx: &CallContext, data: &'a [u8]) -> &'a [u8] {
		self.split(ctx, data).1
	}
}

/// Receiver that accepts calls through one forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedForwarderContext {
	trusted_forwarder: Address,
}

impl TrustedForwarderContext {
	pub fn new(trusted_forwarder: Address) -> Self {
		Self { trusted_forwarder }
	}

	pub fn trusted_forwarder(&self) -> Address {
		self.trusted_forwarder
	}
}

impl ForwarderTrust for TrustedForwarderContext {
	fn is_trusted_forwarder(&self, forwarder: Address) -> bool {
		forwarder == self.trusted_forwarder
	}
}

/// Receiver that accepts calls through both the forwarder registry and the
/// universal forwarder.
///
/// Signers pick either path: a registry approval, revocable and nonce
/// bound, or a permanent universal grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniversalForwardingContext {
	forwarder_registry: Address,
	universal_forwarder: Address,
}

impl UniversalForwardingContext {
	pub fn new(forwarder_registry: Address, universal_forwarder: Address) -> Self {
		Self {
			forwarder_registry,
			universal_forwarder,
		}
	}

	pub fn forwarder_registry(&self) -> Address {
		self.forwarder_registry
	}

	pub fn universal_forwarder(&self) -> Address {
		self.universal_forwarder
	}
}

impl ForwarderTrust for UniversalForwardingContext {
	fn is_trusted_forwarder(&self, forwarder: Address) -> bool {
		forwarder == self.forwarder_registry || forwarder == self.universal_forwarder
	}
}
