//! Forwarding registry.
//!
//! Signers approve forwarders with typed-data signatures. The registry
//! verifies them against the signer's current nonce, optionally persists
//! the approval, and relays the call with the signer appended to the call
//! data.
//!
//! State for a request is committed before its call is dispatched and the
//! commit lock is released during dispatch, so receivers may call back into
//! the registry. When the call reverts, the request's own writes are undone.

use crate::approval::ApprovalStore;
use crate::dispatch::{CallDispatcher, DispatchError};
use crate::nonce::NonceLedger;
use crate::ForwarderError;
use forwarder_storage::StorageService;
use forwarder_types::{
	append_signer, truncate_id, Address, ApproveForwarder, Bytes, CallContext, Eip712Domain,
	ForwardMode, ForwardRequest, StorageKey, REGISTRY_DOMAIN_NAME, U256,
};
use forwarder_verifier::{VerifierError, VerifierService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Consumed signature, keyed by its signature id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SignatureRecord {
	signer: Address,
	nonce: U256,
}

/// Writes made for one signed request.
#[derive(Debug)]
struct Commit {
	signer: Address,
	forwarder: Address,
	nonce: U256,
	signature_key: String,
	recorded: bool,
	/// `(previous, written)` when the approval store was written.
	approval_change: Option<(bool, bool)>,
}

enum Authorization {
	/// Authorized by a persisted approval; nothing was written.
	Stored,
	Signed(Commit),
}

pub struct ForwarderRegistry {
	address: Address,
	domain: Eip712Domain,
	nonces: NonceLedger,
	approvals: ApprovalStore,
	storage: Arc<StorageService>,
	verifier: Arc<VerifierService>,
	dispatcher: Arc<dyn CallDispatcher>,
	commit_lock: Mutex<()>,
}

impl ForwarderRegistry {
	pub fn new(
		chain_id: u64,
		address: Address,
		storage: Arc<StorageService>,
		verifier: Arc<VerifierService>,
		dispatcher: Arc<dyn CallDispatcher>,
	) -> Self {
		Self {
			address,
			domain: Eip712Domain::new(REGISTRY_DOMAIN_NAME, chain_id, address),
			nonces: NonceLedger::new(storage.clone()),
			approvals: ApprovalStore::new(storage.clone()),
			storage,
			verifier,
			dispatcher,
			commit_lock: Mutex::new(()),
		}
	}

	/// Adds a version to the signing domain.
	pub fn with_domain_version(mut self, version: impl Into<String>) -> Self {
		self.domain = self.domain.with_version(version);
		self
	}

	pub fn address(&self) -> Address {
		self.address
	}

	/// Domain approvals must be signed under.
	pub fn domain(&self) -> &Eip712Domain {
		&self.domain
	}

	/// Receivers built for this registry trust only its own address.
	pub fn is_trusted_forwarder(&self, forwarder: Address) -> bool {
		forwarder == self.address
	}

	pub async fn is_approved(
		&self,
		signer: Address,
		forwarder: Address,
	) -> Result<bool, ForwarderError> {
		self.approvals.is_approved(signer, forwarder).await
	}

	pub async fn current_nonce(&self, signer: Address) -> Result<U256, ForwarderError> {
		self.nonces.current_nonce(signer).await
	}

	/// Authorizes `ctx.caller` for `request.signer` and forwards the call.
	///
	/// A signature must be over `ApproveForwarder { signer, forwarder:
	/// ctx.caller, approved: true, nonce: current_nonce(signer) }`. When it
	/// verifies, the nonce is consumed and, in [`ForwardMode::Persist`], the
	/// approval is stored. Without a verifying signature the call goes
	/// through only if the approval is already stored, and no nonce is used.
	///
	/// Returns the output of the forwarded call.
	#[instrument(skip_all, fields(
		signer = %truncate_id(&request.signer.to_string()),
		forwarder = %truncate_id(&ctx.caller.to_string()),
		mode = %request.mode
	))]
	pub async fn check_approval_and_forward(
		&self,
		ctx: &CallContext,
		request: ForwardRequest,
	) -> Result<Bytes, ForwarderError> {
		let authorization = {
			let _guard = self.commit_lock.lock().await;
			self.authorize(ctx.caller, &request).await?
		};

		self.execute(authorization, request.signer, request.target, &request.payload)
			.await
	}

	/// Like [`check_approval_and_forward`](Self::check_approval_and_forward)
	/// for call data that already carries the signer in its last 20 bytes.
	pub async fn check_approval_and_forward_appended(
		&self,
		ctx: &CallContext,
		signature: impl Into<Bytes>,
		mode: ForwardMode,
		target: Address,
		data: &[u8],
	) -> Result<Bytes, ForwarderError> {
		let request = ForwardRequest::from_appended_signer(signature, mode, target, data)
			.ok_or_else(|| {
				ForwarderError::InvalidCallData(format!(
					"{} bytes cannot carry a signer address",
					data.len()
				))
			})?;
		self.check_approval_and_forward(ctx, request).await
	}

	/// Forwards a call relying on a stored approval only.
	pub async fn forward(
		&self,
		ctx: &CallContext,
		signer: Address,
		target: Address,
		payload: impl Into<Bytes>,
	) -> Result<Bytes, ForwarderError> {
		self.check_approval_and_forward(ctx, ForwardRequest::unsigned(signer, target, payload))
			.await
	}

	/// Grants or revokes `ctx.caller` for `signer` without forwarding a call.
	///
	/// The signature must be over `ApproveForwarder` with the given
	/// `approved` flag and the signer's current nonce.
	#[instrument(skip_all, fields(
		signer = %truncate_id(&signer.to_string()),
		forwarder = %truncate_id(&ctx.caller.to_string()),
		approved = approved
	))]
	pub async fn approve_forwarder(
		&self,
		ctx: &CallContext,
		signer: Address,
		approved: bool,
		signature: &[u8],
	) -> Result<(), ForwarderError> {
		let forwarder = ctx.caller;
		let _guard = self.commit_lock.lock().await;

		let signature_key = self.check_not_consumed(signer, signature).await?;
		let nonce = self.nonces.current_nonce(signer).await?;
		let message = ApproveForwarder {
			signer,
			forwarder,
			approved,
			nonce,
		};

		let recovered = self
			.verifier
			.recover(&message.signing_hash(&self.domain), signature)?;
		if recovered != signer {
			return Err(ForwarderError::SignatureMismatch {
				expected: signer,
				recovered,
			});
		}

		self.commit(signer, forwarder, nonce, signature_key, Some(approved))
			.await?;
		tracing::info!(nonce = %nonce, "Forwarder approval updated");
		Ok(())
	}

	async fn authorize(
		&self,
		forwarder: Address,
		request: &ForwardRequest,
	) -> Result<Authorization, ForwarderError> {
		let signer = request.signer;
		if !request.is_signed() {
			return self.stored_approval(signer, forwarder).await;
		}

		let signature_key = self.check_not_consumed(signer, &request.signature).await?;
		let nonce = self.nonces.current_nonce(signer).await?;
		let message = ApproveForwarder {
			signer,
			forwarder,
			approved: true,
			nonce,
		};

		match self
			.verifier
			.recover(&message.signing_hash(&self.domain), &request.signature)
		{
			Ok(recovered) if recovered == signer => {
				let approval = request.mode.is_persist().then_some(true);
				let commit = self
					.commit(signer, forwarder, nonce, signature_key, approval)
					.await?;
				tracing::debug!(nonce = %nonce, "Signed approval accepted");
				Ok(Authorization::Signed(commit))
			},
			Ok(recovered) => {
				tracing::debug!(
					recovered = %truncate_id(&recovered.to_string()),
					"Signature not from signer, falling back to stored approval"
				);
				self.stored_approval(signer, forwarder).await
			},
			Err(VerifierError::MalformedSignature(reason)) => {
				if self.approvals.is_approved(signer, forwarder).await? {
					Ok(Authorization::Stored)
				} else {
					Err(ForwarderError::MalformedSignature(reason))
				}
			},
			Err(e) => Err(e.into()),
		}
	}

	async fn stored_approval(
		&self,
		signer: Address,
		forwarder: Address,
	) -> Result<Authorization, ForwarderError> {
		if self.approvals.is_approved(signer, forwarder).await? {
			Ok(Authorization::Stored)
		} else {
			Err(ForwarderError::ApprovalNotGranted { signer, forwarder })
		}
	}

	/// Returns the storage id of `signature`, failing if it was already used
	/// for `signer`.
	async fn check_not_consumed(
		&self,
		signer: Address,
		signature: &[u8],
	) -> Result<String, ForwarderError> {
		let signature_key = self.verifier.signature_id(signature)?.to_string();
		let record = self
			.storage
			.retrieve_optional::<SignatureRecord>(StorageKey::Signatures, &signature_key)
			.await?;

		match record {
			Some(record) if record.signer == signer => {
				tracing::warn!(nonce = %record.nonce, "Signature already used");
				Err(ForwarderError::ReplayRejected {
					signer,
					nonce: record.nonce,
				})
			},
			_ => Ok(signature_key),
		}
	}

	/// Consumes `nonce`, records the signature and writes `approval` if given.
	/// Either all of it happens or none.
	async fn commit(
		&self,
		signer: Address,
		forwarder: Address,
		nonce: U256,
		signature_key: String,
		approval: Option<bool>,
	) -> Result<Commit, ForwarderError> {
		self.nonces.consume(signer, nonce).await?;

		let mut commit = Commit {
			signer,
			forwarder,
			nonce,
			signature_key,
			recorded: false,
			approval_change: None,
		};
		if let Err(e) = self.record(&mut commit, approval).await {
			self.revert(&commit).await?;
			return Err(e);
		}
		Ok(commit)
	}

	async fn record(
		&self,
		commit: &mut Commit,
		approval: Option<bool>,
	) -> Result<(), ForwarderError> {
		let record = SignatureRecord {
			signer: commit.signer,
			nonce: commit.nonce,
		};
		self.storage
			.store(StorageKey::Signatures, &commit.signature_key, &record)
			.await?;
		commit.recorded = true;

		if let Some(approved) = approval {
			let previous = self
				.approvals
				.set_approval(commit.signer, commit.forwarder, approved)
				.await?;
			commit.approval_change = Some((previous, approved));
		}
		Ok(())
	}

	/// Undoes `commit`, leaving alone anything a later request changed.
	async fn revert(&self, commit: &Commit) -> Result<(), ForwarderError> {
		if !self.nonces.restore(commit.signer, commit.nonce).await? {
			tracing::warn!(
				nonce = %commit.nonce,
				"Nonce advanced by a nested request, keeping it consumed"
			);
		}

		if commit.recorded {
			self.storage
				.remove(StorageKey::Signatures, &commit.signature_key)
				.await?;
		}

		if let Some((previous, written)) = commit.approval_change {
			let current = self
				.approvals
				.is_approved(commit.signer, commit.forwarder)
				.await?;
			if previous != written && current == written {
				self.approvals
					.set_approval(commit.signer, commit.forwarder, previous)
					.await?;
			}
		}
		Ok(())
	}

	async fn execute(
		&self,
		authorization: Authorization,
		signer: Address,
		target: Address,
		payload: &[u8],
	) -> Result<Bytes, ForwarderError> {
		let data = append_signer(payload, signer);

		match self.dispatcher.dispatch(self.address, target, data).await {
			Ok(output) => {
				tracing::info!(
					target_address = %truncate_id(&target.to_string()),
					"Forwarded call"
				);
				Ok(output)
			},
			Err(DispatchError::Reverted(revert_data)) => {
				if let Authorization::Signed(commit) = &authorization {
					let _guard = self.commit_lock.lock().await;
					self.revert(commit).await?;
				}
				tracing::warn!(
					target_address = %truncate_id(&target.to_string()),
					revert_len = revert_data.len(),
					"Forwarded call reverted"
				);
				Err(ForwarderError::ForwardedCallFailed(revert_data))
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dispatch::{CallReceiver, LocalHost};
	use crate::test_utils::{memory_storage, word, DataReceiver, REJECTED};
	use forwarder_account::implementations::local::LocalAccount;
	use forwarder_account::AccountService;
	use forwarder_types::SecretString;
	use forwarder_verifier::implementations::ecdsa::EcdsaVerifier;
	use forwarder_verifier::implementations::mock::MockVerifier;
	use std::sync::OnceLock;

	const CHAIN_ID: u64 = 31337;
	const SIGNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const REGISTRY: Address = Address::repeat_byte(0xee);
	const RECEIVER: Address = Address::repeat_byte(0xcc);
	const FORWARDER: Address = Address::repeat_byte(0xbb);
	const OTHER_FORWARDER: Address = Address::repeat_byte(0xba);

	struct Fixture {
		registry: Arc<ForwarderRegistry>,
		receiver: Arc<DataReceiver>,
		host: Arc<LocalHost>,
		account: AccountService,
		signer: Address,
	}

	impl Fixture {
		async fn new() -> Self {
			let host = Arc::new(LocalHost::new());
			let receiver = Arc::new(DataReceiver::new(REGISTRY));
			host.register(RECEIVER, receiver.clone()).await;

			let verifier = Arc::new(VerifierService::new(Box::new(EcdsaVerifier::new())));
			let registry = Arc::new(ForwarderRegistry::new(
				CHAIN_ID,
				REGISTRY,
				memory_storage(),
				verifier,
				host.clone(),
			));

			let account = AccountService::new(Box::new(
				LocalAccount::new(&SecretString::from(SIGNER_KEY)).unwrap(),
			));
			let signer = account.get_address().await.unwrap();

			Self {
				registry,
				receiver,
				host,
				account,
				signer,
			}
		}

		async fn sign(&self, forwarder: Address, approved: bool, nonce: u64) -> Bytes {
			self.account
				.sign_approval(self.registry.domain(), forwarder, approved, U256::from(nonce))
				.await
				.unwrap()
		}

		fn request(&self, signature: Bytes, mode: ForwardMode, value: u64) -> ForwardRequest {
			ForwardRequest::new(self.signer, signature, mode, RECEIVER, word(value))
		}
	}

	fn from(caller: Address) -> CallContext {
		CallContext::new(caller)
	}

	#[tokio::test]
	async fn test_initial_state() {
		let f = Fixture::new().await;
		assert!(!f.registry.is_approved(f.signer, FORWARDER).await.unwrap());
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::ZERO);
		assert!(f.registry.is_trusted_forwarder(REGISTRY));
		assert!(!f.registry.is_trusted_forwarder(FORWARDER));
		assert_eq!(f.registry.domain().name, REGISTRY_DOMAIN_NAME);
		assert_eq!(f.registry.domain().verifying_contract, REGISTRY);
	}

	#[tokio::test]
	async fn test_end_to_end_persist_then_replay() {
		let f = Fixture::new().await;
		let request = f.request(f.sign(FORWARDER, true, 0).await, ForwardMode::Persist, 42);

		f.registry
			.check_approval_and_forward(&from(FORWARDER), request.clone())
			.await
			.unwrap();
		assert_eq!(f.receiver.get_data(f.signer).await, U256::from(42));
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(1));
		assert!(f.registry.is_approved(f.signer, FORWARDER).await.unwrap());

		let resubmitted = f.request(request.signature, ForwardMode::Persist, 43);
		let replay = f
			.registry
			.check_approval_and_forward(&from(FORWARDER), resubmitted)
			.await
			.unwrap_err();
		assert!(matches!(
			replay,
			ForwarderError::ReplayRejected { signer, nonce }
				if signer == f.signer && nonce == U256::ZERO
		));
		assert_eq!(f.receiver.get_data(f.signer).await, U256::from(42));
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(1));
	}

	#[tokio::test]
	async fn test_persisted_approval_forwards_without_signature() {
		let f = Fixture::new().await;
		let request = f.request(f.sign(FORWARDER, true, 0).await, ForwardMode::Persist, 1);
		f.registry
			.check_approval_and_forward(&from(FORWARDER), request)
			.await
			.unwrap();

		f.registry
			.forward(&from(FORWARDER), f.signer, RECEIVER, word(7))
			.await
			.unwrap();
		assert_eq!(f.receiver.get_data(f.signer).await, U256::from(7));
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(1));

		let other = f
			.registry
			.forward(&from(OTHER_FORWARDER), f.signer, RECEIVER, word(8))
			.await
			.unwrap_err();
		assert!(matches!(other, ForwarderError::ApprovalNotGranted { .. }));
	}

	#[tokio::test]
	async fn test_single_use_consumes_nonce_only() {
		let f = Fixture::new().await;
		let request = f.request(f.sign(FORWARDER, true, 0).await, ForwardMode::SingleUse, 5);

		f.registry
			.check_approval_and_forward(&from(FORWARDER), request)
			.await
			.unwrap();
		assert_eq!(f.receiver.get_data(f.signer).await, U256::from(5));
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(1));
		assert!(!f.registry.is_approved(f.signer, FORWARDER).await.unwrap());

		let unsigned = f
			.registry
			.forward(&from(FORWARDER), f.signer, RECEIVER, word(6))
			.await
			.unwrap_err();
		assert!(matches!(unsigned, ForwarderError::ApprovalNotGranted { .. }));

		let next = f.request(f.sign(FORWARDER, true, 1).await, ForwardMode::SingleUse, 6);
		f.registry
			.check_approval_and_forward(&from(FORWARDER), next)
			.await
			.unwrap();
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(2));
	}

	#[tokio::test]
	async fn test_unapproved_unsigned_caller_rejected() {
		let f = Fixture::new().await;
		let err = f
			.registry
			.forward(&from(FORWARDER), f.signer, RECEIVER, word(1))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			ForwarderError::ApprovalNotGranted { signer, forwarder }
				if signer == f.signer && forwarder == FORWARDER
		));
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::ZERO);
		assert_eq!(f.receiver.get_data(f.signer).await, U256::ZERO);
	}

	#[tokio::test]
	async fn test_signature_bound_to_caller() {
		let f = Fixture::new().await;
		let request = f.request(f.sign(FORWARDER, true, 0).await, ForwardMode::Persist, 1);

		let err = f
			.registry
			.check_approval_and_forward(&from(OTHER_FORWARDER), request)
			.await
			.unwrap_err();
		assert!(matches!(err, ForwarderError::ApprovalNotGranted { .. }));
		assert!(!f.registry.is_approved(f.signer, OTHER_FORWARDER).await.unwrap());
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::ZERO);
	}

	#[tokio::test]
	async fn test_signature_bound_to_nonce() {
		let f = Fixture::new().await;
		let ahead = f.request(f.sign(FORWARDER, true, 1).await, ForwardMode::SingleUse, 1);

		let err = f
			.registry
			.check_approval_and_forward(&from(FORWARDER), ahead)
			.await
			.unwrap_err();
		assert!(matches!(err, ForwarderError::ApprovalNotGranted { .. }));
	}

	#[tokio::test]
	async fn test_invalid_format_is_fatal() {
		let f = Fixture::new().await;
		let request = f.request(f.sign(FORWARDER, true, 0).await, ForwardMode::Persist, 1);
		f.registry
			.check_approval_and_forward(&from(FORWARDER), request)
			.await
			.unwrap();

		let truncated = f.request(Bytes::from(vec![1u8; 64]), ForwardMode::SingleUse, 2);
		let err = f
			.registry
			.check_approval_and_forward(&from(FORWARDER), truncated)
			.await
			.unwrap_err();
		assert!(matches!(err, ForwarderError::InvalidSignatureFormat(_)));
		assert_eq!(f.receiver.get_data(f.signer).await, U256::from(1));
	}

	#[tokio::test]
	async fn test_foreign_signature_uses_stored_approval() {
		let f = Fixture::new().await;
		let request = f.request(f.sign(FORWARDER, true, 0).await, ForwardMode::Persist, 1);
		f.registry
			.check_approval_and_forward(&from(FORWARDER), request)
			.await
			.unwrap();

		// Signed for another forwarder, so it does not verify here
		let foreign = f.request(f.sign(OTHER_FORWARDER, true, 1).await, ForwardMode::SingleUse, 9);
		f.registry
			.check_approval_and_forward(&from(FORWARDER), foreign)
			.await
			.unwrap();
		assert_eq!(f.receiver.get_data(f.signer).await, U256::from(9));
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(1));
	}

	#[tokio::test]
	async fn test_grant_and_revoke_cycle() {
		let f = Fixture::new().await;

		let grant = f.sign(FORWARDER, true, 0).await;
		f.registry
			.approve_forwarder(&from(FORWARDER), f.signer, true, &grant)
			.await
			.unwrap();
		assert!(f.registry.is_approved(f.signer, FORWARDER).await.unwrap());
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(1));

		let replay = f
			.registry
			.approve_forwarder(&from(FORWARDER), f.signer, true, &grant)
			.await
			.unwrap_err();
		assert!(matches!(replay, ForwarderError::ReplayRejected { .. }));

		let revoke = f.sign(FORWARDER, false, 1).await;
		f.registry
			.approve_forwarder(&from(FORWARDER), f.signer, false, &revoke)
			.await
			.unwrap();
		assert!(!f.registry.is_approved(f.signer, FORWARDER).await.unwrap());
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(2));

		let err = f
			.registry
			.forward(&from(FORWARDER), f.signer, RECEIVER, word(1))
			.await
			.unwrap_err();
		assert!(matches!(err, ForwarderError::ApprovalNotGranted { .. }));
	}

	#[tokio::test]
	async fn test_repeated_grant_still_consumes_nonce() {
		let f = Fixture::new().await;
		for nonce in 0..2 {
			let grant = f.sign(FORWARDER, true, nonce).await;
			f.registry
				.approve_forwarder(&from(FORWARDER), f.signer, true, &grant)
				.await
				.unwrap();
		}
		assert!(f.registry.is_approved(f.signer, FORWARDER).await.unwrap());
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(2));
	}

	#[tokio::test]
	async fn test_approve_with_wrong_flag_is_mismatch() {
		let f = Fixture::new().await;
		let grant = f.sign(FORWARDER, true, 0).await;

		let err = f
			.registry
			.approve_forwarder(&from(FORWARDER), f.signer, false, &grant)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			ForwarderError::SignatureMismatch { expected, recovered }
				if expected == f.signer && recovered != f.signer
		));
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::ZERO);
	}

	#[tokio::test]
	async fn test_revert_rolls_back_request_state() {
		let f = Fixture::new().await;
		let signature = f.sign(FORWARDER, true, 0).await;

		let err = f
			.registry
			.check_approval_and_forward(
				&from(FORWARDER),
				f.request(signature.clone(), ForwardMode::Persist, 0),
			)
			.await
			.unwrap_err();
		match err {
			ForwarderError::ForwardedCallFailed(data) => assert_eq!(&data[..], REJECTED),
			other => panic!("unexpected error: {other}"),
		}
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::ZERO);
		assert!(!f.registry.is_approved(f.signer, FORWARDER).await.unwrap());

		// Nothing of the failed request remains, so the signature is still usable
		let retry = f.request(signature, ForwardMode::Persist, 3);
		f.registry
			.check_approval_and_forward(&from(FORWARDER), retry)
			.await
			.unwrap();
		assert_eq!(f.receiver.get_data(f.signer).await, U256::from(3));
	}

	#[tokio::test]
	async fn test_appended_signer_call_data() {
		let f = Fixture::new().await;
		let signature = f.sign(FORWARDER, true, 0).await;
		let data = append_signer(&word(11), f.signer);

		f.registry
			.check_approval_and_forward_appended(
				&from(FORWARDER),
				signature.clone(),
				ForwardMode::SingleUse,
				RECEIVER,
				&data,
			)
			.await
			.unwrap();
		assert_eq!(f.receiver.get_data(f.signer).await, U256::from(11));

		let err = f
			.registry
			.check_approval_and_forward_appended(
				&from(FORWARDER),
				signature,
				ForwardMode::SingleUse,
				RECEIVER,
				&[0u8; 10],
			)
			.await
			.unwrap_err();
		assert!(matches!(err, ForwarderError::InvalidCallData(_)));
	}

	/// Receiver that submits `inner` to the registry while handling a call.
	struct ReentrantReceiver {
		address: Address,
		registry: OnceLock<Arc<ForwarderRegistry>>,
		inner: ForwardRequest,
		revert_after: bool,
		outcome: Mutex<Option<Result<Bytes, ForwarderError>>>,
	}

	#[async_trait::async_trait]
	impl CallReceiver for ReentrantReceiver {
		async fn on_call(&self, _ctx: CallContext, _data: Bytes) -> Result<Bytes, Bytes> {
			let Some(registry) = self.registry.get() else {
				return Err(Bytes::from_static(b"unbound"));
			};
			let outcome = registry
				.check_approval_and_forward(&CallContext::new(self.address), self.inner.clone())
				.await;
			*self.outcome.lock().await = Some(outcome);

			if self.revert_after {
				Err(Bytes::from_static(b"nested"))
			} else {
				Ok(Bytes::new())
			}
		}
	}

	async fn reentrant(
		f: &Fixture,
		inner: ForwardRequest,
		revert_after: bool,
	) -> Arc<ReentrantReceiver> {
		let address = Address::repeat_byte(0xdd);
		let receiver = Arc::new(ReentrantReceiver {
			address,
			registry: OnceLock::new(),
			inner,
			revert_after,
			outcome: Mutex::new(None),
		});
		let _ = receiver.registry.set(f.registry.clone());
		f.host.register(address, receiver.clone()).await;
		receiver
	}

	#[tokio::test]
	async fn test_reentrant_replay_rejected() {
		let f = Fixture::new().await;
		let signature = f.sign(FORWARDER, true, 0).await;
		let receiver = reentrant(
			&f,
			f.request(signature.clone(), ForwardMode::SingleUse, 1),
			false,
		)
		.await;

		let outer = ForwardRequest::new(
			f.signer,
			signature,
			ForwardMode::SingleUse,
			receiver.address,
			Bytes::new(),
		);
		f.registry
			.check_approval_and_forward(&from(FORWARDER), outer)
			.await
			.unwrap();

		let inner = receiver.outcome.lock().await.take().unwrap();
		assert!(matches!(inner, Err(ForwarderError::ReplayRejected { .. })));
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(1));
		assert_eq!(f.receiver.get_data(f.signer).await, U256::ZERO);
	}

	#[tokio::test]
	async fn test_nested_success_survives_outer_revert() {
		let f = Fixture::new().await;
		let reentrant_address = Address::repeat_byte(0xdd);
		let inner = f.request(
			f.sign(reentrant_address, true, 1).await,
			ForwardMode::SingleUse,
			5,
		);
		let receiver = reentrant(&f, inner, true).await;

		let outer = ForwardRequest::new(
			f.signer,
			f.sign(FORWARDER, true, 0).await,
			ForwardMode::Persist,
			receiver.address,
			Bytes::new(),
		);
		let err = f
			.registry
			.check_approval_and_forward(&from(FORWARDER), outer)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			ForwarderError::ForwardedCallFailed(ref data) if &data[..] == b"nested"
		));

		let inner = receiver.outcome.lock().await.take().unwrap();
		assert!(inner.is_ok());
		assert_eq!(f.receiver.get_data(f.signer).await, U256::from(5));
		// The outer nonce stays consumed because the nested request built on it
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(2));
		assert!(!f.registry.is_approved(f.signer, FORWARDER).await.unwrap());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_submissions_single_winner() {
		let f = Fixture::new().await;
		let request = f.request(f.sign(FORWARDER, true, 0).await, ForwardMode::SingleUse, 4);

		let handles: Vec<_> = (0..8)
			.map(|_| {
				let registry = f.registry.clone();
				let request = request.clone();
				tokio::spawn(async move {
					registry
						.check_approval_and_forward(&CallContext::new(FORWARDER), request)
						.await
				})
			})
			.collect();

		let mut succeeded = 0;
		for handle in handles {
			match handle.await.unwrap() {
				Ok(_) => succeeded += 1,
				Err(e) => assert!(matches!(e, ForwarderError::ReplayRejected { .. })),
			}
		}
		assert_eq!(succeeded, 1);
		assert_eq!(f.registry.current_nonce(f.signer).await.unwrap(), U256::from(1));
	}

	#[tokio::test]
	async fn test_with_mock_verifier() {
		let host = Arc::new(LocalHost::new());
		let receiver = Arc::new(DataReceiver::new(REGISTRY));
		host.register(RECEIVER, receiver.clone()).await;
		let registry = ForwarderRegistry::new(
			CHAIN_ID,
			REGISTRY,
			memory_storage(),
			Arc::new(VerifierService::new(Box::new(MockVerifier))),
			host,
		);

		let signer = Address::repeat_byte(0x0a);
		let digest = ApproveForwarder {
			signer,
			forwarder: FORWARDER,
			approved: true,
			nonce: U256::ZERO,
		}
		.signing_hash(registry.domain());
		let request = ForwardRequest::new(
			signer,
			MockVerifier::sign(signer, &digest),
			ForwardMode::Persist,
			RECEIVER,
			word(21),
		);
		registry
			.check_approval_and_forward(&from(FORWARDER), request)
			.await
			.unwrap();
		assert_eq!(receiver.get_data(signer).await, U256::from(21));

		// Recovers to the zero address
		let malformed = ForwardRequest::new(
			Address::repeat_byte(0x0b),
			MockVerifier::sign(Address::ZERO, &digest),
			ForwardMode::SingleUse,
			RECEIVER,
			word(1),
		);
		let err = registry
			.check_approval_and_forward(&from(FORWARDER), malformed)
			.await
			.unwrap_err();
		assert!(matches!(err, ForwarderError::MalformedSignature(_)));
	}

	#[tokio::test]
	async fn test_domain_version_changes_digest() {
		let f = Fixture::new().await;
		let registry = ForwarderRegistry::new(
			CHAIN_ID,
			REGISTRY,
			memory_storage(),
			Arc::new(VerifierService::new(Box::new(EcdsaVerifier::new()))),
			f.host.clone(),
		)
		.with_domain_version("1");
		assert_eq!(registry.domain().version.as_deref(), Some("1"));

		// Signed under the unversioned domain
		let request = f.request(f.sign(FORWARDER, true, 0).await, ForwardMode::SingleUse, 1);
		let err = registry
			.check_approval_and_forward(&from(FORWARDER), request)
			.await
			.unwrap_err();
		assert!(matches!(err, ForwarderError::ApprovalNotGranted { .. }));
	}
}
