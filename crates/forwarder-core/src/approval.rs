//! Persisted (signer, forwarder) approvals.

use crate::ForwarderError;
use forwarder_storage::StorageService;
use forwarder_types::{Address, StorageKey};
use std::sync::Arc;

/// Approval flags keyed by signer and forwarder.
///
/// Written only by the registry after it has verified a signature.
pub struct ApprovalStore {
	storage: Arc<StorageService>,
}

impl ApprovalStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	fn id(signer: Address, forwarder: Address) -> String {
		format!("{}-{}", signer, forwarder)
	}

	pub async fn is_approved(
		&self,
		signer: Address,
		forwarder: Address,
	) -> Result<bool, ForwarderError> {
		let approved = self
			.storage
			.retrieve_optional::<bool>(StorageKey::Approvals, &Self::id(signer, forwarder))
			.await?;
		Ok(approved.unwrap_or(false))
	}

	/// Sets the approval, returning the previous value.
	pub(crate) async fn set_approval(
		&self,
		signer: Address,
		forwarder: Address,
		approved: bool,
	) -> Result<bool, ForwarderError> {
		let previous = self.is_approved(signer, forwarder).await?;
		let id = Self::id(signer, forwarder);
		if approved {
			self.storage.store(StorageKey::Approvals, &id, &true).await?;
		} else if previous {
			self.storage.remove(StorageKey::Approvals, &id).await?;
		}
		Ok(previous)
	}
}
