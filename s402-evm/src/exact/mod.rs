//! EVM "exact" payment scheme.
//!
//! Payments are ERC-3009 `transferWithAuthorization` authorizations: the
//! payer signs a `TransferWithAuthorization` message off-chain and the
//! facilitator submits it, paying gas.

pub mod error;
pub mod facilitator;
pub mod types;

pub use error::ExactEvmError;
pub use facilitator::ExactEvmFacilitator;
pub use types::{Eip3009Authorization, ExactEvmPayload, TokenAmount};

/// Scheme identifier.
pub const SCHEME_EXACT: &str = "exact";
