//! Shared fixtures for the core tests.

use crate::dispatch::CallReceiver;
use crate::receiver::{ForwarderTrust, TrustedForwarderContext, UniversalForwardingContext};
use forwarder_storage::implementations::memory::MemoryStorage;
use forwarder_storage::StorageService;
use forwarder_types::{Address, Bytes, CallContext, U256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Revert data returned by [`DataReceiver`] for rejected values.
pub const REJECTED: &[u8] = b"value rejected";

pub fn memory_storage() -> Arc<StorageService> {
	Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
}

/// Encodes a value as a 32-byte big-endian word.
pub fn word(value: u64) -> Bytes {
	Bytes::copy_from_slice(&U256::from(value).to_be_bytes::<32>())
}

/// Receiver storing one value per sender.
///
/// Accepts a 32-byte word and reverts with [`REJECTED`] when the value is
/// zero.
pub struct DataReceiver {
	context: Box<dyn ForwarderTrust>,
	data: RwLock<HashMap<Address, U256>>,
}

impl DataReceiver {
	pub fn new(trusted_forwarder: Address) -> Self {
		Self::with_trust(Box::new(TrustedForwarderContext::new(trusted_forwarder)))
	}

	/// Receiver trusting both the registry and the universal forwarder.
	pub fn universal(forwarder_registry: Address, universal_forwarder: Address) -> Self {
		Self::with_trust(Box::new(UniversalForwardingContext::new(
			forwarder_registry,
			universal_forwarder,
		)))
	}

	fn with_trust(context: Box<dyn ForwarderTrust>) -> Self {
		Self {
			context,
			data: RwLock::new(HashMap::new()),
		}
	}

	pub async fn get_data(&self, sender: Address) -> U256 {
		self.data.read().await.get(&sender).copied().unwrap_or_default()
	}
}

#[async_trait::async_trait]
impl CallReceiver for DataReceiver {
	async fn on_call(&self, ctx: CallContext, data: Bytes) -> Result<Bytes, Bytes> {
		let (sender, payload) = self.context.split(&ctx, &data);
		if payload.len() != 32 {
			return Err(Bytes::from_static(b"bad payload"));
		}
		let value = U256::from_be_slice(payload);
		if value.is_zero() {
			return Err(Bytes::from_static(REJECTED));
		}
		self.data.write().await.insert(sender, value);
		Ok(Bytes::new())
	}
}
