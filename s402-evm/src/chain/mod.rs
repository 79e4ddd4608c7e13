//! EVM chain access.
//!
//! [`ChainClient`] wraps one JSON-RPC endpoint. Supporting types:
//!
//! - [`TransactionIntent`] and [`TransactionReceipt`] for the write path
//! - [`WriteLocks`] for serializing writes per signer address
//! - [`ChainError`] and [`RpcError`] with retry classification
//! - [`contract`] for the Solidity interfaces the crate calls

mod client;
pub mod contract;
mod error;
mod lock;
mod types;

pub use client::{ChainClient, parse_abi, rpc_client};
pub use error::{ChainError, RpcError, RpcErrorKind, TimeoutError};
pub use lock::{WriteGuard, WriteLocks};
pub use types::{ChainId, TransactionIntent, TransactionReceipt, caip2, parse_caip2};
