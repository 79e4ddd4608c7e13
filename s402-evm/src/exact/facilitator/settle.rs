//! Settlement of a verified ERC-3009 authorization.

use alloy_primitives::{Address, TxHash, U256};
use alloy_sol_types::SolCall;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::chain::contract::IEIP3009;
use crate::chain::{ChainClient, ChainError};
use crate::exact::error::ExactEvmError;
use crate::exact::types::ExactEvmPayload;

/// Calldata for `transferWithAuthorization(..., bytes signature)`.
#[must_use]
pub fn transfer_call(payload: &ExactEvmPayload) -> IEIP3009::transferWithAuthorization_0Call {
    let auth = &payload.authorization;
    IEIP3009::transferWithAuthorization_0Call {
        from: auth.from,
        to: auth.to,
        value: auth.value.into(),
        validAfter: U256::from(auth.valid_after.as_secs()),
        validBefore: U256::from(auth.valid_before.as_secs()),
        nonce: auth.nonce,
        signature: payload.signature.clone(),
    }
}

/// Broadcasts `transferWithAuthorization` on `token` from the client's
/// signer and, when `wait` is set, waits for a successful receipt.
///
/// The signer's write lock is held from nonce query through broadcast and
/// released before waiting.
///
/// # Errors
///
/// Returns [`ExactEvmError::Chain`] when preparing or broadcasting fails,
/// [`ExactEvmError::AfterBroadcast`] when the receipt wait fails or is
/// cancelled, and [`ExactEvmError::Reverted`] when the receipt reports failure.
#[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(token = %token, payer = %payload.authorization.from)))]
pub async fn settle_payment(
    client: &ChainClient,
    token: Address,
    payload: &ExactEvmPayload,
    wait: bool,
    cancel: &CancellationToken,
) -> Result<TxHash, ExactEvmError> {
    let from = client.signer().ok_or(ChainError::NoSigner)?.address()?;
    let data = transfer_call(payload).abi_encode();

    let tx_hash = {
        let _guard = client.write_locks().acquire(from).await;
        let intent = client
            .prepare_transaction(from, token, U256::ZERO, data.into())
            .await?;
        client.submit(intent).await?
    };

    if !wait {
        return Ok(tx_hash);
    }
    let receipt = client
        .wait_for_receipt_default(tx_hash, cancel)
        .await
        .map_err(|source| ExactEvmError::AfterBroadcast { tx_hash, source })?;
    if receipt.succeeded() {
        #[cfg(feature = "telemetry")]
        tracing::info!(%tx_hash, block = receipt.block_number, "Settlement mined");
        Ok(tx_hash)
    } else {
        #[cfg(feature = "telemetry")]
        tracing::warn!(%tx_hash, "Settlement reverted");
        Err(ExactEvmError::Reverted(tx_hash))
    }
}
