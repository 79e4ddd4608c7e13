//! Error types for chain access.

use std::fmt;
use std::time::Duration;

use alloy_primitives::TxHash;
use alloy_transport::TransportError;

use crate::signer::SigningError;

/// What went wrong on the RPC side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorKind {
    /// Network, HTTP or node availability failure.
    Transport,
    /// The node asked us to slow down.
    RateLimited,
    /// A bounded request did not complete in time.
    Timeout,
    /// The nonce was already used; refresh it before retrying.
    NonceTooLow,
    /// The sender cannot pay for value plus gas.
    InsufficientFunds,
    /// The gas limit is below what the transaction needs.
    GasTooLow,
    /// The call or transaction reverted during execution.
    Reverted,
    /// Any other rejection reported by the node.
    Rejected,
    /// The node answered with something we could not decode.
    InvalidResponse,
}

impl RpcErrorKind {
    /// Whether an identical request may succeed if simply sent again.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transport | Self::RateLimited | Self::Timeout)
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::RateLimited => "rate limited",
            Self::Timeout => "timeout",
            Self::NonceTooLow => "nonce too low",
            Self::InsufficientFunds => "insufficient funds",
            Self::GasTooLow => "gas too low",
            Self::Reverted => "execution reverted",
            Self::Rejected => "rejected",
            Self::InvalidResponse => "invalid response",
        }
    }

    /// Classifies a node error message.
    fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("nonce too low")
            || lower.contains("nonce is too low")
            || lower.contains("already known")
            || lower.contains("replacement transaction underpriced")
        {
            Self::NonceTooLow
        } else if lower.contains("insufficient funds") {
            Self::InsufficientFunds
        } else if lower.contains("gas too low")
            || lower.contains("intrinsic gas")
            || lower.contains("out of gas")
        {
            Self::GasTooLow
        } else if lower.contains("revert") {
            Self::Reverted
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            Self::RateLimited
        } else {
            Self::Rejected
        }
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed RPC request, classified for retry decisions.
///
/// Transport failures are retryable. State conflicts such as a stale nonce or
/// an underfunded sender are not: the caller has to refresh state first.
#[derive(Debug, Clone, thiserror::Error)]
#[error("RPC {kind} error: {message}")]
pub struct RpcError {
    kind: RpcErrorKind,
    message: String,
}

impl RpcError {
    /// Creates an error of a given kind.
    #[must_use]
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The classified failure.
    #[must_use]
    pub const fn kind(&self) -> RpcErrorKind {
        self.kind
    }

    /// Whether an identical request may succeed if simply sent again.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// The node's or transport's message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        let kind = if let Some(payload) = err.as_error_resp() {
            // -32005 is the conventional "limit exceeded" code.
            if payload.code == -32005 {
                RpcErrorKind::RateLimited
            } else {
                RpcErrorKind::from_message(&payload.message)
            }
        } else if err.is_transport_error() {
            RpcErrorKind::Transport
        } else {
            RpcErrorKind::InvalidResponse
        };
        Self::new(kind, err.to_string())
    }
}

/// No receipt was observed before the deadline.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no receipt for transaction {tx_hash} after {waited:?}")]
pub struct TimeoutError {
    /// The transaction being waited on.
    pub tx_hash: TxHash,
    /// How long the wait lasted.
    pub waited: Duration,
}

/// Errors returned by [`ChainClient`](crate::chain::ChainClient).
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The RPC request failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The transaction digest could not be signed.
    #[error(transparent)]
    Signing(#[from] SigningError),
    /// A receipt did not arrive in time.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
    /// The endpoint serves a different chain than expected.
    #[error("chain id mismatch: expected {expected}, node reports {actual}")]
    ChainIdMismatch {
        /// Configured chain id.
        expected: u64,
        /// Chain id reported by the node.
        actual: u64,
    },
    /// The endpoint URL is not usable.
    #[error("unsupported RPC endpoint: {0}")]
    UnsupportedEndpoint(String),
    /// A write was attempted on a client without a signer.
    #[error("client has no signer")]
    NoSigner,
    /// The contract ABI, function name, arguments or return data are wrong.
    #[error("contract ABI error: {0}")]
    Abi(String),
}

impl ChainError {
    /// Whether retrying the same operation unchanged may succeed.
    ///
    /// Submissions are never retried by the client itself.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(e) => e.retryable(),
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<TransportError> for ChainError {
    fn from(err: TransportError) -> Self {
        Self::Rpc(err.into())
    }
}
