//! Facilitator side of the exact scheme.
//!
//! [`ExactEvmFacilitator`] verifies ERC-3009 `TransferWithAuthorization`
//! payments and settles them by calling `transferWithAuthorization` on the
//! token. Every failure is reported as a typed [`VerifyResponse`] or
//! [`SettleResponse`] carrying an [`ErrorReason`](s402_proto::ErrorReason).

mod settle;
mod verify;

use std::sync::Arc;

use alloy_primitives::{Address, TxHash};
use s402_proto::{PaymentPayload, PaymentRequirements, SettleResponse, UnixTimestamp, VerifyResponse};
use tokio_util::sync::CancellationToken;
#[cfg(feature = "telemetry")]
use tracing::instrument;

pub use settle::{settle_payment, transfer_call};
pub use verify::{
    EXPIRY_BUFFER_SECS, assert_domain, assert_enough_balance, assert_enough_value,
    assert_nonce_unused, assert_signature, assert_time,
};

use crate::chain::{ChainClient, caip2};
use crate::config::FacilitatorConfig;
use crate::exact::SCHEME_EXACT;
use crate::exact::error::ExactEvmError;
use crate::exact::types::{ExactEvmPayload, TokenAmount};
use crate::signature::SignatureVerifier;

/// Verifies and settles exact-scheme payments on one EVM network.
#[derive(Debug)]
pub struct ExactEvmFacilitator {
    client: Arc<ChainClient>,
    verifier: SignatureVerifier,
    network: String,
    clock_skew_tolerance: u64,
    wait_for_receipt: bool,
}

impl ExactEvmFacilitator {
    /// Serves the client's chain with contract-wallet support, a 30 second
    /// clock skew tolerance and receipt waiting.
    #[must_use]
    pub fn new(client: Arc<ChainClient>) -> Self {
        Self {
            network: caip2(client.chain_id()),
            verifier: SignatureVerifier::with_on_chain(Arc::clone(&client)),
            client,
            clock_skew_tolerance: 30,
            wait_for_receipt: true,
        }
    }

    /// Connects and builds a facilitator from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ExactEvmError::Signing`] when no usable key is configured and
    /// [`ExactEvmError::Chain`] when the connection fails.
    pub async fn from_config(config: &FacilitatorConfig) -> Result<Self, ExactEvmError> {
        let signer = Arc::new(config.signer()?);
        let client = ChainClient::connect(config.chain.clone())
            .await?
            .with_signer(signer);
        let mut facilitator = Self::new(Arc::new(client))
            .with_clock_skew_tolerance(config.clock_skew_tolerance_secs)
            .with_wait_for_receipt(config.wait_for_receipt);
        if let Some(network) = &config.network {
            facilitator.network.clone_from(network);
        }
        Ok(facilitator)
    }

    /// Overrides the CAIP-2 network identifier served.
    #[must_use]
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Replaces the signature verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// Seconds `validAfter` may lie in the future.
    #[must_use]
    pub const fn with_clock_skew_tolerance(mut self, secs: u64) -> Self {
        self.clock_skew_tolerance = secs;
        self
    }

    /// Whether settlement waits for the receipt.
    #[must_use]
    pub const fn with_wait_for_receipt(mut self, wait: bool) -> Self {
        self.wait_for_receipt = wait;
        self
    }

    /// The CAIP-2 network served.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The underlying chain client.
    #[must_use]
    pub const fn client(&self) -> &Arc<ChainClient> {
        &self.client
    }

    /// Addresses settlement transactions are sent from.
    #[must_use]
    pub fn signer_addresses(&self) -> Vec<Address> {
        self.client.signer_addresses()
    }

    /// The payment scheme handled, always `exact`.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        SCHEME_EXACT
    }

    /// CAIP-2 pattern of the networks this scheme applies to.
    #[must_use]
    pub const fn caip_family(&self) -> &'static str {
        "eip155:*"
    }

    fn check_envelope(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<ExactEvmPayload, ExactEvmError> {
        for scheme in [payload.scheme(), requirements.scheme.as_str()] {
            if scheme != SCHEME_EXACT {
                return Err(ExactEvmError::UnsupportedScheme(scheme.to_owned()));
            }
        }
        if requirements.network != self.network {
            return Err(ExactEvmError::UnsupportedNetwork(requirements.network.clone()));
        }
        if payload.network() != requirements.network {
            return Err(ExactEvmError::NetworkMismatch {
                payload: payload.network().to_owned(),
                required: requirements.network.clone(),
            });
        }
        if &payload.accepted != requirements {
            return Err(ExactEvmError::AcceptedRequirementsMismatch);
        }
        serde_json::from_value(payload.payload.clone())
            .map_err(|e| ExactEvmError::InvalidPayload(e.to_string()))
    }

    /// Runs every check on a decoded payload and returns the token address.
    async fn verify_authorization(
        &self,
        exact: &ExactEvmPayload,
        requirements: &PaymentRequirements,
    ) -> Result<Address, ExactEvmError> {
        let auth = &exact.authorization;
        let asset: Address = requirements
            .asset
            .parse()
            .map_err(|_| ExactEvmError::InvalidRequirements(format!("asset `{}`", requirements.asset)))?;
        let pay_to: Address = requirements
            .pay_to
            .parse()
            .map_err(|_| ExactEvmError::InvalidRequirements(format!("payTo `{}`", requirements.pay_to)))?;
        let required: TokenAmount = requirements
            .amount
            .parse()
            .map_err(|e| ExactEvmError::InvalidRequirements(format!("amount: {e}")))?;

        if auth.to != pay_to {
            return Err(ExactEvmError::RecipientMismatch);
        }
        assert_enough_value(auth.value.into(), required.into())?;
        assert_time(
            auth.valid_after,
            auth.valid_before,
            UnixTimestamp::now(),
            self.clock_skew_tolerance,
        )?;
        let domain = assert_domain(self.client.chain_id(), asset, requirements)?;
        assert_signature(&self.verifier, auth, domain, &exact.signature).await?;
        assert_nonce_unused(&self.client, asset, auth.from, auth.nonce).await?;
        assert_enough_balance(&self.client, asset, auth.from, auth.value.into()).await?;
        Ok(asset)
    }

    /// Verifies a payment. Reads chain state but submits nothing.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, fields(network = %requirements.network)))]
    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> VerifyResponse {
        let exact = match self.check_envelope(payload, requirements) {
            Ok(exact) => exact,
            Err(e) => return VerifyResponse::invalid(e.reason(), e.to_string()),
        };
        let payer = exact.authorization.from.to_string();
        match self.verify_authorization(&exact, requirements).await {
            Ok(_) => VerifyResponse::valid(payer),
            Err(e) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(reason = %e.reason(), error = %e, "Payment rejected");
                VerifyResponse::invalid(e.reason(), e.to_string()).with_payer(payer)
            }
        }
    }

    /// Re-verifies and settles a payment.
    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleResponse {
        self.settle_with_cancel(payload, requirements, &CancellationToken::new())
            .await
    }

    /// [`settle`](Self::settle) with a token that aborts the receipt wait.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, fields(network = %requirements.network)))]
    pub async fn settle_with_cancel(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        cancel: &CancellationToken,
    ) -> SettleResponse {
        let network = requirements.network.clone();
        let exact = match self.check_envelope(payload, requirements) {
            Ok(exact) => exact,
            Err(e) => return SettleResponse::error(e.reason(), e.to_string(), network),
        };
        let payer = exact.authorization.from.to_string();
        match self.settle_authorization(&exact, requirements, cancel).await {
            Ok(tx_hash) => SettleResponse::success(tx_hash.to_string(), network, payer),
            Err(e) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(reason = %e.reason(), error = %e, "Settlement failed");
                let response = SettleResponse::error(e.reason(), e.to_string(), network).with_payer(payer);
                match e.transaction() {
                    Some(hash) => response.with_transaction(hash.to_string()),
                    None => response,
                }
            }
        }
    }

    async fn settle_authorization(
        &self,
        exact: &ExactEvmPayload,
        requirements: &PaymentRequirements,
        cancel: &CancellationToken,
    ) -> Result<TxHash, ExactEvmError> {
        let asset = self.verify_authorization(exact, requirements).await?;
        settle_payment(&self.client, asset, exact, self.wait_for_receipt, cancel).await
    }
}
