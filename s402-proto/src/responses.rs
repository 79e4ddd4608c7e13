//! Facilitator response types.
//!
//! Every outcome of verification or settlement, including failures caused by
//! the chain, is expressed as one of these values. Callers never have to
//! interpret a transport error to learn why a payment was refused.

use serde::{Deserialize, Serialize};

use crate::{ErrorReason, Network};

/// Response from payment verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the payment is valid.
    pub is_valid: bool,

    /// Machine-readable reason for invalidity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<ErrorReason>,

    /// Human-readable message for invalidity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_message: Option<String>,

    /// The payer's address, when it could be determined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    /// Creates a valid verification response.
    #[must_use]
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            invalid_message: None,
            payer: Some(payer.into()),
        }
    }

    /// Creates an invalid verification response.
    #[must_use]
    pub fn invalid(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            invalid_message: Some(message.into()),
            payer: None,
        }
    }

    /// Attaches the payer's address.
    #[must_use]
    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }
}

/// Response from payment settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Whether settlement was successful.
    pub success: bool,

    /// Machine-readable reason for failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,

    /// Human-readable message for failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// The payer's address, when it could be determined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,

    /// Transaction hash. Empty when nothing was broadcast.
    pub transaction: String,

    /// Network where settlement was attempted.
    pub network: Network,
}

impl SettleResponse {
    /// Creates a successful settlement response.
    #[must_use]
    pub fn success(
        transaction: impl Into<String>,
        network: impl Into<String>,
        payer: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            error_reason: None,
            error_message: None,
            payer: Some(payer.into()),
            transaction: transaction.into(),
            network: network.into(),
        }
    }

    /// Creates a failed settlement response.
    #[must_use]
    pub fn error(
        reason: ErrorReason,
        message: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            error_message: Some(message.into()),
            payer: None,
            transaction: String::new(),
            network: network.into(),
        }
    }

    /// Attaches the payer's address.
    #[must_use]
    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }

    /// Attaches a transaction hash, for failures that happened after broadcast.
    #[must_use]
    pub fn with_transaction(mut self, transaction: impl Into<String>) -> Self {
        self.transaction = transaction.into();
        self
    }
}
