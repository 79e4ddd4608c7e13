//! Precondition checks for an ERC-3009 authorization.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use s402_proto::{PaymentRequirements, UnixTimestamp};
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::chain::contract::IEIP3009;
use crate::chain::{ChainClient, ChainError};
use crate::eip712::TypedDataDomain;
use crate::exact::error::ExactEvmError;
use crate::exact::types::Eip3009Authorization;
use crate::networks;
use crate::signature::SignatureVerifier;

/// Seconds before `validBefore` at which an authorization counts as expired.
pub const EXPIRY_BUFFER_SECS: u64 = 6;

/// Checks the authorization window against `now`.
///
/// `validAfter` may lie up to `skew_tolerance` seconds in the future.
///
/// # Errors
///
/// Returns [`ExactEvmError::Expired`] or [`ExactEvmError::Early`].
pub fn assert_time(
    valid_after: UnixTimestamp,
    valid_before: UnixTimestamp,
    now: UnixTimestamp,
    skew_tolerance: u64,
) -> Result<(), ExactEvmError> {
    if valid_before < now + EXPIRY_BUFFER_SECS {
        return Err(ExactEvmError::Expired);
    }
    if valid_after > now + skew_tolerance {
        return Err(ExactEvmError::Early);
    }
    Ok(())
}

/// Checks that the authorized value covers the required amount.
///
/// # Errors
///
/// Returns [`ExactEvmError::InsufficientValue`].
pub fn assert_enough_value(authorized: U256, required: U256) -> Result<(), ExactEvmError> {
    if authorized < required {
        Err(ExactEvmError::InsufficientValue {
            authorized,
            required,
        })
    } else {
        Ok(())
    }
}

/// Builds the token's EIP-712 domain.
///
/// Name and version come from `requirements.extra` when present, otherwise
/// from the known-network table.
///
/// # Errors
///
/// Returns [`ExactEvmError::UnknownDomain`] when neither source has them.
pub fn assert_domain(
    chain_id: u64,
    asset: Address,
    requirements: &PaymentRequirements,
) -> Result<TypedDataDomain, ExactEvmError> {
    let known = networks::find_asset(chain_id, asset);
    let name = requirements
        .extra_str("name")
        .or_else(|| known.map(|a| a.name));
    let version = requirements
        .extra_str("version")
        .or_else(|| known.map(|a| a.version));
    match (name, version) {
        (Some(name), Some(version)) => Ok(TypedDataDomain::default()
            .with_name(name)
            .with_version(version)
            .with_chain_id(chain_id)
            .with_verifying_contract(asset)),
        _ => Err(ExactEvmError::UnknownDomain(asset.to_string())),
    }
}

/// Checks the payer's signature over the authorization.
///
/// # Errors
///
/// Returns [`ExactEvmError::InvalidSignature`] when it does not belong to
/// `authorization.from`, or [`ExactEvmError::Chain`] when the on-chain check
/// could not run.
#[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(payer = %authorization.from)))]
pub async fn assert_signature(
    verifier: &SignatureVerifier,
    authorization: &Eip3009Authorization,
    domain: TypedDataDomain,
    signature: &[u8],
) -> Result<(), ExactEvmError> {
    let typed = authorization.typed_data(domain);
    if verifier
        .verify_typed_data(&typed, signature, authorization.from)
        .await?
    {
        Ok(())
    } else {
        Err(ExactEvmError::InvalidSignature(
            "signature does not belong to the payer".to_owned(),
        ))
    }
}

/// Checks that the authorization nonce has not been consumed.
///
/// # Errors
///
/// Returns [`ExactEvmError::NonceAlreadyUsed`] or [`ExactEvmError::Chain`].
#[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(authorizer = %authorizer, token = %token)))]
pub async fn assert_nonce_unused(
    client: &ChainClient,
    token: Address,
    authorizer: Address,
    nonce: B256,
) -> Result<(), ExactEvmError> {
    let call = IEIP3009::authorizationStateCall { authorizer, nonce };
    let output = client.call(token, call.abi_encode().into()).await?;
    let used = IEIP3009::authorizationStateCall::abi_decode_returns(&output)
        .map_err(|e| ChainError::Abi(e.to_string()))?;
    if used {
        Err(ExactEvmError::NonceAlreadyUsed)
    } else {
        Ok(())
    }
}

/// Checks that `payer` holds at least `required` of `token`.
///
/// # Errors
///
/// Returns [`ExactEvmError::InsufficientFunds`] or [`ExactEvmError::Chain`].
pub async fn assert_enough_balance(
    client: &ChainClient,
    token: Address,
    payer: Address,
    required: U256,
) -> Result<(), ExactEvmError> {
    let balance = client.get_balance(payer, Some(token)).await?;
    if balance < required {
        Err(ExactEvmError::InsufficientFunds { balance, required })
    } else {
        Ok(())
    }
}
