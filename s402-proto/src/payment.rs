//! Payment payload and requirement types.
//!
//! A resource server sends [`PaymentRequirements`] describing what it wants to
//! be paid; the buyer answers with a [`PaymentPayload`] carrying a
//! scheme-specific signed authorization. The facilitator receives both in a
//! [`VerifyRequest`] or [`SettleRequest`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Network, X402_VERSION};

/// Payment requirements published by a resource server.
///
/// # JSON Format
///
/// ```json
/// {
///   "scheme": "exact",
///   "network": "eip155:8453",
///   "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
///   "amount": "1000000",
///   "payTo": "0x...",
///   "maxTimeoutSeconds": 300,
///   "extra": { "name": "USD Coin", "version": "2" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme identifier (e.g., "exact").
    pub scheme: String,

    /// CAIP-2 network identifier (e.g., "eip155:8453").
    pub network: Network,

    /// Token contract address.
    pub asset: String,

    /// Amount in the token's smallest unit, as a decimal string.
    pub amount: String,

    /// Recipient address.
    pub pay_to: String,

    /// Maximum time in seconds the authorization may stay open.
    pub max_timeout_seconds: u64,

    /// Scheme-specific data, such as the token's EIP-712 domain name and version.
    #[serde(default = "default_empty_object")]
    pub extra: Value,
}

impl PaymentRequirements {
    /// Returns a string field from `extra`, if present and non-empty.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Payment payload sent by the buyer.
///
/// # JSON Format
///
/// ```json
/// {
///   "x402Version": 2,
///   "payload": { "authorization": {...}, "signature": "0x..." },
///   "accepted": { "scheme": "exact", "network": "eip155:8453", ... }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version.
    #[serde(default = "default_version")]
    pub x402_version: u32,

    /// Scheme-specific payload data.
    pub payload: Value,

    /// The payment requirements the buyer agreed to.
    pub accepted: PaymentRequirements,

    /// Optional extension data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl PaymentPayload {
    /// Returns the payment scheme from the accepted requirements.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.accepted.scheme
    }

    /// Returns the network from the accepted requirements.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.accepted.network
    }
}

/// Request to verify a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// The payment payload to verify.
    pub payment_payload: PaymentPayload,

    /// The requirements to verify against.
    pub payment_requirements: PaymentRequirements,
}

/// Request to settle a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// The payment payload to settle.
    pub payment_payload: PaymentPayload,

    /// The requirements for settlement.
    pub payment_requirements: PaymentRequirements,
}

const fn default_version() -> u32 {
    X402_VERSION
}

fn default_empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}
