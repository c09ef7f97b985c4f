//! Delivery of forwarded calls to receivers.

use async_trait::async_trait;
use forwarder_types::{truncate_id, Address, Bytes, CallContext};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
	/// The target rejected the call with this revert data.
	#[error("Call reverted ({} bytes of revert data)", .0.len())]
	Reverted(Bytes),
}

/// Executes a call from `caller` to `target`.
///
/// Implementations may run arbitrary receiver code, including code that
/// calls back into the forwarder that dispatched the call.
#[async_trait]
pub trait CallDispatcher: Send + Sync {
	async fn dispatch(
		&self,
		caller: Address,
		target: Address,
		data: Bytes,
	) -> Result<Bytes, DispatchError>;
}

/// A contract-like receiver reachable through a [`LocalHost`].
#[async_trait]
pub trait CallReceiver: Send + Sync {
	/// Handles a call; `Err` carries revert data.
	async fn on_call(&self, ctx: CallContext, data: Bytes) -> Result<Bytes, Bytes>;
}

/// In-process dispatcher routing calls to registered receivers.
///
/// A call to an address without a receiver succeeds with empty output, as a
/// call to an account without code does.
#[derive(Default)]
pub struct LocalHost {
	receivers: RwLock<HashMap<Address, Arc<dyn CallReceiver>>>,
}

impl LocalHost {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn register(&self, address: Address, receiver: Arc<dyn CallReceiver>) {
		self.receivers.write().await.insert(address, receiver);
	}

	pub async fn unregister(&self, address: Address) -> bool {
		self.receivers.write().await.remove(&address).is_some()
	}
}

#[async_trait]
impl CallDispatcher for LocalHost {
	async fn dispatch(
		&self,
		caller: Address,
		target: Address,
		data: Bytes,
	) -> Result<Bytes, DispatchError> {
		// Release the map before running receiver code, which may dispatch again
		let receiver = self.receivers.read().await.get(&target).cloned();

		let Some(receiver) = receiver else {
			tracing::debug!(
				target_address = %truncate_id(&target.to_string()),
				"No receiver registered, call has no effect"
			);
			return Ok(Bytes::new());
		};

		receiver
			.on_call(CallContext::new(caller), data)
			.await
			.map_err(DispatchError::Reverted)
	}
}
