#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM signing and settlement engine for x402-style payments.
//!
//! # Architecture
//!
//! - [`eip712`] - typed-data hashing: type strings, struct hashes, domain separators, digests
//! - [`signer`] - digest signing through an in-process key or an external callback
//! - [`signature`] - signer recovery with an EIP-1271 fallback for contract wallets
//! - [`chain`] - JSON-RPC client: reads, writes, receipts, balances, code
//! - [`exact`] - the ERC-3009 "exact" scheme built on the modules above
//! - [`config`] - serde configuration structs parsed from TOML
//! - [`networks`] - known networks and their USDC deployments
//!
//! # Feature Flags
//!
//! - `telemetry` (default) - `tracing` spans and events
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use s402_evm::chain::ChainClient;
//! use s402_evm::config::ChainClientConfig;
//! use s402_evm::signer::{DigestSigner, KeyBackedSigner};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let signer = KeyBackedSigner::from_hex(&std::env::var("SIGNER_KEY")?)?;
//! let config = ChainClientConfig::new("https://sepolia.base.org".parse()?).with_chain_id(84532);
//! let client = ChainClient::connect(config)
//!     .await?
//!     .with_signer(Arc::new(DigestSigner::from(signer)));
//! println!("connected to chain {}", client.chain_id());
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod config;
pub mod eip712;
pub mod exact;
pub mod networks;
pub mod signature;
pub mod signer;

#[cfg(test)]
mod testing;

pub use chain::{ChainClient, ChainError};
pub use eip712::{TypedData, TypedDataDomain};
pub use exact::ExactEvmFacilitator;
pub use signature::SignatureVerifier;
pub use signer::DigestSigner;
