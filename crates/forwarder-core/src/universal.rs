//! Stateless universal forwarder.
//!
//! Accepts `ApproveForwarderForever { signer, forwarder }` grants. Nothing is
//! stored: a grant stays valid for as long as the forwarder exists and the
//! same signature can be submitted any number of times. Signers who want a
//! revocable approval use the registry instead.

use crate::dispatch::{CallDispatcher, DispatchError};
use crate::ForwarderError;
use forwarder_types::{
	append_signer, truncate_id, Address, ApproveForwarderForever, Bytes, CallContext,
	Eip712Domain, ForwardRequest, B256, UNIVERSAL_DOMAIN_NAME,
};
use forwarder_verifier::VerifierService;
use std::sync::Arc;
use tracing::instrument;

/// Deterministic deployment proxy used for CREATE2 deployments at the same
/// address on every chain.
pub const DETERMINISTIC_DEPLOYER: Address = Address::new([
	0x4e, 0x59, 0xb4, 0x48, 0x47, 0xb3, 0x79, 0x57, 0x85, 0x88, 0x92, 0x0c, 0xa7, 0x8f, 0xbf, 0x26,
	0xc0, 0xb4, 0x95, 0x6c,
]);

/// Address of a contract deployed through [`DETERMINISTIC_DEPLOYER`] with a
/// zero salt.
pub fn deterministic_address(init_code_hash: B256) -> Address {
	DETERMINISTIC_DEPLOYER.create2(B256::ZERO, init_code_hash)
}

pub struct UniversalForwarder {
	address: Address,
	domain: Eip712Domain,
	verifier: Arc<VerifierService>,
	dispatcher: Arc<dyn CallDispatcher>,
}

impl UniversalForwarder {
	pub fn new(
		chain_id: u64,
		address: Address,
		verifier: Arc<VerifierService>,
		dispatcher: Arc<dyn CallDispatcher>,
	) -> Self {
		Self {
			address,
			domain: Eip712Domain::new(UNIVERSAL_DOMAIN_NAME, chain_id, address),
			verifier,
			dispatcher,
		}
	}

	/// Forwarder at its deterministic deployment address.
	pub fn deterministic(
		chain_id: u64,
		init_code_hash: B256,
		verifier: Arc<VerifierService>,
		dispatcher: Arc<dyn CallDispatcher>,
	) -> Self {
		Self::new(
			chain_id,
			deterministic_address(init_code_hash),
			verifier,
			dispatcher,
		)
	}

	pub fn address(&self) -> Address {
		self.address
	}

	pub fn domain(&self) -> &Eip712Domain {
		&self.domain
	}

	pub fn is_trusted_forwarder(&self, forwarder: Address) -> bool {
		forwarder == self.address
	}

	/// Verifies the grant from `request.signer` to `ctx.caller` and forwards
	/// the call. The request mode has no effect.
	#[instrument(skip_all, fields(
		signer = %truncate_id(&request.signer.to_string()),
		forwarder = %truncate_id(&ctx.caller.to_string())
	))]
	pub async fn forward(
		&self,
		ctx: &CallContext,
		request: ForwardRequest,
	) -> Result<Bytes, ForwarderError> {
		let signer = request.signer;
		let forwarder = ctx.caller;
		if !request.is_signed() {
			return Err(ForwarderError::ApprovalNotGranted { signer, forwarder });
		}

		let grant = ApproveForwarderForever { signer, forwarder };
		let recovered = self
			.verifier
			.recover(&grant.signing_hash(&self.domain), &request.signature)?;
		if recovered != signer {
			return Err(ForwarderError::SignatureMismatch {
				expected: signer,
				recovered,
			});
		}

		let data = append_signer(&request.payload, signer);
		match self.dispatcher.dispatch(self.address, request.target, data).await {
			Ok(output) => {
				tracing::info!(
					target_address = %truncate_id(&request.target.to_string()),
					"Forwarded call"
				);
				Ok(output)
			},
			Err(DispatchError::Reverted(revert_data)) => {
				tracing::warn!(revert_len = revert_data.len(), "Forwarded call reverted");
				Err(ForwarderError::ForwardedCallFailed(revert_data))
			},
		}
	}
}
