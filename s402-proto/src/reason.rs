//! Machine-readable failure codes.

use serde::{Deserialize, Serialize};

/// Reason codes carried by failed verify and settle responses.
///
/// Serialized in `snake_case` so clients can branch on them without parsing
/// the human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorReason {
    /// The payment payload format is invalid.
    InvalidFormat,
    /// The payment amount is incorrect.
    InvalidPaymentAmount,
    /// The payment authorization is not yet valid.
    InvalidPaymentEarly,
    /// The payment authorization has expired.
    InvalidPaymentExpired,
    /// The chain ID doesn't match.
    ChainIdMismatch,
    /// The recipient address doesn't match.
    RecipientMismatch,
    /// The token asset doesn't match.
    AssetMismatch,
    /// The accepted details don't match requirements.
    AcceptedRequirementsMismatch,
    /// The signature is invalid.
    InvalidSignature,
    /// Insufficient on-chain balance.
    InsufficientFunds,
    /// The chain is not supported.
    UnsupportedChain,
    /// The scheme is not supported.
    UnsupportedScheme,
    /// The authorization nonce has already been used.
    NonceAlreadyUsed,
    /// The settlement transaction was mined but reverted.
    TransactionReverted,
    /// No receipt was observed before the deadline.
    TransactionTimeout,
    /// The chain node rejected or failed a request.
    RpcFailure,
    /// An unexpected error occurred.
    UnexpectedError,
}

impl ErrorReason {
    /// Returns the `snake_case` string representation matching the wire format.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::InvalidPaymentAmount => "invalid_payment_amount",
            Self::InvalidPaymentEarly => "invalid_payment_early",
            Self::InvalidPaymentExpired => "invalid_payment_expired",
            Self::ChainIdMismatch => "chain_id_mismatch",
            Self::RecipientMismatch => "recipient_mismatch",
            Self::AssetMismatch => "asset_mismatch",
            Self::AcceptedRequirementsMismatch => "accepted_requirements_mismatch",
            Self::InvalidSignature => "invalid_signature",
            Self::InsufficientFunds => "insufficient_funds",
            Self::UnsupportedChain => "unsupported_chain",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::NonceAlreadyUsed => "nonce_already_used",
            Self::TransactionReverted => "transaction_reverted",
            Self::TransactionTimeout => "transaction_timeout",
            Self::RpcFailure => "rpc_failure",
            Self::UnexpectedError => "unexpected_error",
        }
    }
}

impl core::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_matches_serde() {
        for reason in [
            ErrorReason::InvalidPaymentEarly,
            ErrorReason::NonceAlreadyUsed,
            ErrorReason::TransactionTimeout,
            ErrorReason::RpcFailure,
        ] {
            let json = serde_json::to_value(reason).unwrap();
            assert_eq!(json.as_str(), Some(reason.as_str()));
        }
    }
}
