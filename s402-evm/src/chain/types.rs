//! Transaction and receipt types.

use alloy_consensus::{SignableTransaction, TxLegacy};
use alloy_primitives::{Address, B256, Bytes, TxHash, TxKind, U256};
use serde::{Deserialize, Serialize};

/// An EIP-155 chain ID (e.g., 8453 for Base, 137 for Polygon).
pub type ChainId = u64;

/// Formats a chain ID as a CAIP-2 identifier.
///
/// Example: `caip2(8453)` returns `"eip155:8453"`.
#[must_use]
pub fn caip2(chain_id: ChainId) -> String {
    format!("eip155:{chain_id}")
}

/// Parses a CAIP-2 identifier into an EIP-155 chain ID.
///
/// Returns `None` if the input is not a valid `eip155:` prefixed string.
#[must_use]
pub fn parse_caip2(caip: &str) -> Option<ChainId> {
    caip.strip_prefix("eip155:").and_then(|s| s.parse().ok())
}

/// A fully populated, unsigned legacy transaction.
///
/// Built by [`ChainClient::prepare_transaction`](crate::chain::ChainClient::prepare_transaction)
/// and consumed by [`ChainClient::submit`](crate::chain::ChainClient::submit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    /// Sending address; must be one the signer signs for.
    pub from: Address,
    /// Recipient or contract address.
    pub to: Address,
    /// Native value in wei.
    pub value: U256,
    /// Call data.
    pub data: Bytes,
    /// Sender nonce.
    pub nonce: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Gas limit.
    pub gas_limit: u64,
    /// EIP-155 chain id.
    pub chain_id: ChainId,
}

impl TransactionIntent {
    /// The unsigned legacy transaction this intent describes.
    #[must_use]
    pub fn to_legacy(&self) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: TxKind::Call(self.to),
            value: self.value,
            input: self.data.clone(),
        }
    }

    /// The EIP-155 digest the signer has to sign.
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        self.to_legacy().signature_hash()
    }
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    /// `1` for success, `0` for revert.
    pub status: u64,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Hash of the transaction.
    pub transaction_hash: TxHash,
}

impl TransactionReceipt {
    /// Whether execution succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.status == 1
    }
}
