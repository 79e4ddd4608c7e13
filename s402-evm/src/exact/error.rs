//! Error types for the exact scheme facilitator.

use alloy_primitives::{TxHash, U256};
use s402_proto::ErrorReason;

use crate::chain::{ChainError, RpcErrorKind};
use crate::eip712::EncodingError;
use crate::signature::VerificationError;
use crate::signer::SigningError;

/// Why an exact-scheme payment was rejected or failed to settle.
#[derive(Debug, thiserror::Error)]
pub enum ExactEvmError {
    /// The scheme is not `exact`.
    #[error("unsupported scheme `{0}`")]
    UnsupportedScheme(String),
    /// The requirements name a network this facilitator does not serve.
    #[error("network `{0}` is not served here")]
    UnsupportedNetwork(String),
    /// The payload was built for another network.
    #[error("payload network `{payload}` does not match `{required}`")]
    NetworkMismatch {
        /// Network in the payload.
        payload: String,
        /// Network in the requirements.
        required: String,
    },
    /// The payload accepted different requirements than the ones presented.
    #[error("accepted requirements differ from the payment requirements")]
    AcceptedRequirementsMismatch,
    /// The scheme payload does not decode.
    #[error("invalid exact payload: {0}")]
    InvalidPayload(String),
    /// A requirements field is malformed.
    #[error("invalid payment requirements: {0}")]
    InvalidRequirements(String),
    /// The authorization pays someone else.
    #[error("authorization recipient does not match payTo")]
    RecipientMismatch,
    /// The authorized value is below the required amount.
    #[error("authorized {authorized} is less than required {required}")]
    InsufficientValue {
        /// Value in the authorization.
        authorized: U256,
        /// Amount in the requirements.
        required: U256,
    },
    /// `validBefore` has passed or is about to.
    #[error("authorization expired")]
    Expired,
    /// `validAfter` is still in the future.
    #[error("authorization not yet valid")]
    Early,
    /// Neither `extra` nor the network table names the token's EIP-712 domain.
    #[error("unknown EIP-712 domain for asset {0}")]
    UnknownDomain(String),
    /// The signature does not belong to the payer.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// The authorization nonce was already consumed on-chain.
    #[error("authorization nonce already used")]
    NonceAlreadyUsed,
    /// The payer cannot cover the transfer.
    #[error("balance {balance} is less than {required}")]
    InsufficientFunds {
        /// Payer's token balance.
        balance: U256,
        /// Value to transfer.
        required: U256,
    },
    /// The settlement transaction was mined and reverted.
    #[error("transaction {0} reverted")]
    Reverted(TxHash),
    /// The settlement account cannot sign.
    #[error(transparent)]
    Signing(#[from] SigningError),
    /// Chain access failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// The settlement transaction was broadcast but its outcome is unknown.
    #[error("transaction {tx_hash} broadcast, awaiting receipt failed: {source}")]
    AfterBroadcast {
        /// Hash of the broadcast transaction.
        tx_hash: TxHash,
        /// Why the receipt could not be obtained.
        source: ChainError,
    },
}

const fn chain_reason(err: &ChainError) -> ErrorReason {
    match err {
        ChainError::NoSigner => ErrorReason::UnexpectedError,
        ChainError::Timeout(_) | ChainError::Cancelled => ErrorReason::TransactionTimeout,
        ChainError::Rpc(e) if matches!(e.kind(), RpcErrorKind::Reverted) => {
            ErrorReason::TransactionReverted
        }
        ChainError::Rpc(e) if matches!(e.kind(), RpcErrorKind::InsufficientFunds) => {
            ErrorReason::InsufficientFunds
        }
        _ => ErrorReason::RpcFailure,
    }
}

impl ExactEvmError {
    /// Wire code for this failure.
    #[must_use]
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::UnsupportedScheme(_) => ErrorReason::UnsupportedScheme,
            Self::UnsupportedNetwork(_) => ErrorReason::UnsupportedChain,
            Self::NetworkMismatch { .. } => ErrorReason::ChainIdMismatch,
            Self::AcceptedRequirementsMismatch => ErrorReason::AcceptedRequirementsMismatch,
            Self::InvalidPayload(_) | Self::InvalidRequirements(_) | Self::UnknownDomain(_) => {
                ErrorReason::InvalidFormat
            }
            Self::RecipientMismatch => ErrorReason::RecipientMismatch,
            Self::InsufficientValue { .. } => ErrorReason::InvalidPaymentAmount,
            Self::Expired => ErrorReason::InvalidPaymentExpired,
            Self::Early => ErrorReason::InvalidPaymentEarly,
            Self::InvalidSignature(_) => ErrorReason::InvalidSignature,
            Self::NonceAlreadyUsed => ErrorReason::NonceAlreadyUsed,
            Self::InsufficientFunds { .. } => ErrorReason::InsufficientFunds,
            Self::Reverted(_) => ErrorReason::TransactionReverted,
            Self::Signing(_) => ErrorReason::UnexpectedError,
            Self::Chain(e) | Self::AfterBroadcast { source: e, .. } => chain_reason(e),
        }
    }

    /// Hash of the broadcast transaction, for failures after broadcast.
    #[must_use]
    pub const fn transaction(&self) -> Option<TxHash> {
        match self {
            Self::Reverted(hash) | Self::AfterBroadcast { tx_hash: hash, .. } => Some(*hash),
            Self::Chain(ChainError::Timeout(t)) => Some(t.tx_hash),
            _ => None,
        }
    }
}

impl From<EncodingError> for ExactEvmError {
    fn from(err: EncodingError) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

impl From<VerificationError> for ExactEvmError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::Chain(e) => Self::Chain(e),
            VerificationError::Encoding(e) => e.into(),
            other => Self::InvalidSignature(other.to_string()),
        }
    }
}
