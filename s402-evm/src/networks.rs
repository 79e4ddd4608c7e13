//! Known EVM networks and their USDC deployments.
//!
//! The exact scheme needs each token's EIP-712 domain name and version to
//! rebuild what the payer signed. Payment requirements may carry them in
//! `extra`; this table is the fallback.

use alloy_primitives::{Address, address};

use crate::chain::{ChainId, caip2, parse_caip2};

/// Base Mainnet chain ID.
pub const BASE_MAINNET: ChainId = 8453;

/// Base Sepolia (testnet) chain ID.
pub const BASE_SEPOLIA: ChainId = 84532;

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: ChainId = 1;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: ChainId = 137;

/// Polygon Amoy (testnet) chain ID.
pub const POLYGON_AMOY: ChainId = 80002;

/// Avalanche C-Chain chain ID.
pub const AVALANCHE_MAINNET: ChainId = 43114;

/// Avalanche Fuji (testnet) chain ID.
pub const AVALANCHE_FUJI: ChainId = 43113;

/// EIP-712 domain name most USDC deployments use.
pub const USDC_NAME: &str = "USD Coin";

/// EIP-712 domain version of USDC v2 contracts.
pub const USDC_VERSION: &str = "2";

/// A token the facilitator knows how to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownAsset {
    /// Token contract.
    pub address: Address,
    /// Token decimals.
    pub decimals: u8,
    /// EIP-712 domain name.
    pub name: &'static str,
    /// EIP-712 domain version.
    pub version: &'static str,
}

/// An EVM network and the assets deployed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownNetwork {
    /// EIP-155 chain id.
    pub chain_id: ChainId,
    /// Assets on this chain.
    pub assets: &'static [KnownAsset],
}

impl KnownNetwork {
    /// CAIP-2 identifier, e.g. `eip155:8453`.
    #[must_use]
    pub fn caip2(&self) -> String {
        caip2(self.chain_id)
    }

    /// The asset deployed at `address`, if known.
    #[must_use]
    pub fn asset(&self, address: Address) -> Option<&'static KnownAsset> {
        self.assets.iter().find(|a| a.address == address)
    }
}

const fn usdc(address: Address) -> KnownAsset {
    KnownAsset {
        address,
        decimals: 6,
        name: USDC_NAME,
        version: USDC_VERSION,
    }
}

/// Every network in the table.
pub const KNOWN_NETWORKS: &[KnownNetwork] = &[
    KnownNetwork {
        chain_id: BASE_MAINNET,
        assets: &[usdc(address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"))],
    },
    KnownNetwork {
        chain_id: BASE_SEPOLIA,
        assets: &[usdc(address!("036CbD53842c5426634e7929541eC2318f3dCF7e"))],
    },
    KnownNetwork {
        chain_id: ETHEREUM_MAINNET,
        assets: &[usdc(address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"))],
    },
    KnownNetwork {
        chain_id: POLYGON_MAINNET,
        assets: &[usdc(address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359"))],
    },
    KnownNetwork {
        chain_id: POLYGON_AMOY,
        assets: &[usdc(address!("41E94Eb71Ef8C9fAE0235d1e472b21E21B5a4dbF"))],
    },
    KnownNetwork {
        chain_id: AVALANCHE_MAINNET,
        assets: &[usdc(address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"))],
    },
    KnownNetwork {
        chain_id: AVALANCHE_FUJI,
        assets: &[usdc(address!("5425890298aed601595a70AB815c96711a31Bc65"))],
    },
];

/// Looks a network up by chain id.
#[must_use]
pub fn by_chain_id(chain_id: ChainId) -> Option<&'static KnownNetwork> {
    KNOWN_NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

/// Looks a network up by CAIP-2 identifier.
#[must_use]
pub fn by_caip2(network: &str) -> Option<&'static KnownNetwork> {
    parse_caip2(network).and_then(by_chain_id)
}

/// The known asset at `address` on `chain_id`.
#[must_use]
pub fn find_asset(chain_id: ChainId, address: Address) -> Option<&'static KnownAsset> {
    by_chain_id(chain_id)?.asset(address)
}
