//! Wire format types for x402-style payment verification and settlement.
//!
//! This crate holds the serialization-level structures a facilitator exchanges
//! with resource servers: the payment payload and requirements it is asked to
//! check, and the typed verify/settle responses it answers with. It depends
//! only on `serde`, `serde_json` and `thiserror`, so HTTP layers can share it
//! without pulling in any chain code.
//!
//! # Modules
//!
//! - [`payment`] - `PaymentRequirements`, `PaymentPayload` and the request envelopes
//! - [`responses`] - `VerifyResponse` and `SettleResponse`
//! - [`reason`] - machine-readable failure codes
//! - [`timestamp`] - `UnixTimestamp` used by authorization windows

pub mod payment;
pub mod reason;
pub mod responses;
pub mod timestamp;

pub use payment::{PaymentPayload, PaymentRequirements, SettleRequest, VerifyRequest};
pub use reason::ErrorReason;
pub use responses::{SettleResponse, VerifyResponse};
pub use timestamp::UnixTimestamp;

/// Current protocol version.
pub const X402_VERSION: u32 = 2;

/// CAIP-2 format network identifier (e.g., `"eip155:8453"`).
pub type Network = String;

/// Errors that can occur when parsing payment messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The `x402Version` field has an unsupported value.
    #[error("invalid x402Version: {0}")]
    InvalidVersion(u32),

    /// JSON deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses a [`VerifyRequest`] body and checks its protocol version.
///
/// # Errors
///
/// Returns [`ProtocolError::Json`] when the body is malformed and
/// [`ProtocolError::InvalidVersion`] when the payload is not version 2.
pub fn parse_verify_request(body: &[u8]) -> Result<VerifyRequest, ProtocolError> {
    let request: VerifyRequest = serde_json::from_slice(body)?;
    if request.payment_payload.x402_version != X402_VERSION {
        return Err(ProtocolError::InvalidVersion(
            request.payment_payload.x402_version,
        ));
    }
    Ok(request)
}
