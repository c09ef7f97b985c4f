//! Per-signer replay protection counters.

use crate::ForwarderError;
use forwarder_storage::StorageService;
use forwarder_types::{Address, StorageKey, U256};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Monotonic nonce per signer, starting at zero.
///
/// Checking a nonce and advancing it happen under one lock, so a nonce is
/// consumed at most once.
pub struct NonceLedger {
	storage: Arc<StorageService>,
	lock: Mutex<()>,
}

impl NonceLedger {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			lock: Mutex::new(()),
		}
	}

	/// Next nonce `signer` must sign.
	pub async fn current_nonce(&self, signer: Address) -> Result<U256, ForwarderError> {
		let stored = self
			.storage
			.retrieve_optional::<U256>(StorageKey::Nonces, &signer.to_string())
			.await?;
		Ok(stored.unwrap_or_default())
	}

	/// Consumes `expected` if it is the current nonce of `signer`.
	///
	/// Returns the new current nonce.
	pub(crate) async fn consume(
		&self,
		signer: Address,
		expected: U256,
	) -> Result<U256, ForwarderError> {
		let _guard = self.lock.lock().await;

		let current = self.current_nonce(signer).await?;
		if current != expected {
			return Err(ForwarderError::ReplayRejected {
				signer,
				nonce: expected,
			});
		}

		let next = current
			.checked_add(U256::from(1))
			.ok_or(ForwarderError::NonceExhausted(signer))?;
		self.storage
			.store(StorageKey::Nonces, &signer.to_string(), &next)
			.await?;
		Ok(next)
	}

	/// Gives back `consumed` if nothing has advanced the nonce since.
	///
	/// Returns whether the nonce was restored.
	pub(crate) async fn restore(
		&self,
		signer: Address,
		consumed: U256,
	) -> Result<bool, ForwarderError> {
		let _guard = self.lock.lock().await;

		let current = self.current_nonce(signer).await?;
		if consumed.checked_add(U256::from(1)) != Some(current) {
			return Ok(false);
		}
		self.storage
			.store(StorageKey::Nonces, &signer.to_string(), &consumed)
			.await?;
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::memory_storage;

	#[tokio::test]
	async fn test_starts_at_zero() {
		let ledger = NonceLedger::new(memory_storage());
		assert_eq!(
			ledger.current_nonce(Address::repeat_byte(0x01)).await.unwrap(),
			U256::ZERO
		);
	}

	#[tokio::test]
	async fn test_consume_advances_once() {
		let ledger = NonceLedger::new(memory_storage());
		let signer = Address::repeat_byte(0x01);

		assert_eq!(ledger.consume(signer, U256::ZERO).await.unwrap(), U256::from(1));
		assert_eq!(ledger.current_nonce(signer).await.unwrap(), U256::from(1));

		let err = ledger.consume(signer, U256::ZERO).await.unwrap_err();
		assert!(matches!(
			err,
			ForwarderError::ReplayRejected { nonce, .. } if nonce == U256::ZERO
		));
		assert_eq!(ledger.current_nonce(signer).await.unwrap(), U256::from(1));
	}

	#[tokio::test]
	async fn test_future_nonce_rejected() {
		let ledger = NonceLedger::new(memory_storage());
		let signer = Address::repeat_byte(0x01);
		assert!(ledger.consume(signer, U256::from(5)).await.is_err());
		assert_eq!(ledger.current_nonce(signer).await.unwrap(), U256::ZERO);
	}

	#[tokio::test]
	async fn test_signers_are_independent() {
		let ledger = NonceLedger::new(memory_storage());
		ledger.consume(Address::repeat_byte(0x01), U256::ZERO).await.unwrap();
		assert_eq!(
			ledger.current_nonce(Address::repeat_byte(0x02)).await.unwrap(),
			U256::ZERO
		);
	}

	#[tokio::test]
	async fn test_restore_only_latest_consumption() {
		let ledger = NonceLedger::new(memory_storage());
		let signer = Address::repeat_byte(0x01);

		ledger.consume(signer, U256::ZERO).await.unwrap();
		ledger.consume(signer, U256::from(1)).await.unwrap();

		assert!(!ledger.restore(signer, U256::ZERO).await.unwrap());
		assert_eq!(ledger.current_nonce(signer).await.unwrap(), U256::from(2));

		assert!(ledger.restore(signer, U256::from(1)).await.unwrap());
		assert_eq!(ledger.current_nonce(signer).await.unwrap(), U256::from(1));
	}

	#[tokio::test]
	async fn test_exhausted_nonce() {
		let storage = memory_storage();
		let signer = Address::repeat_byte(0x01);
		storage
			.store(StorageKey::Nonces, &signer.to_string(), &U256::MAX)
			.await
			.unwrap();

		let ledger = NonceLedger::new(storage);
		assert!(matches!(
			ledger.consume(signer, U256::MAX).await,
			Err(ForwarderError::NonceExhausted(a)) if a == signer
		));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_consume_single_winner() {
		let ledger = Arc::new(NonceLedger::new(memory_storage()));
		let signer = Address::repeat_byte(0x01);

		let handles: Vec<_> = (0..16)
			.map(|_| {
				let ledger = ledger.clone();
				tokio::spawn(async move { ledger.consume(signer, U256::ZERO).await.is_ok() })
			})
			.collect();

		let mut winners = 0;
		for handle in handles {
			if handle.await.unwrap() {
				winners += 1;
			}
		}
		assert_eq!(winners, 1);
		assert_eq!(ledger.current_nonce(signer).await.unwrap(), U256::from(1));
	}
}
