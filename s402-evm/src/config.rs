//! Chain client and facilitator configuration.
//!
//! Configuration is plain `serde` data with defaults for everything except
//! the RPC URL. Where the text comes from (a file, the environment, flags) is
//! up to the embedding process.
//!
//! # Example
//!
//! ```toml
//! network = "eip155:84532"
//! wait_for_receipt = true
//!
//! [chain]
//! rpc_url = "https://sepolia.base.org"
//! chain_id = 84532
//! receipt_timeout_secs = 60
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chain::ChainId;
use crate::signer::{DigestSigner, SigningError};

/// Errors raised while parsing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML text is malformed or does not match the schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Connection and transaction settings for a [`ChainClient`](crate::chain::ChainClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainClientConfig {
    /// HTTP(S) JSON-RPC endpoint.
    pub rpc_url: Url,

    /// Chain id the endpoint must report. Unchecked when absent.
    #[serde(default)]
    pub chain_id: Option<ChainId>,

    /// Maximum requests per second sent to the endpoint.
    #[serde(default)]
    pub rate_limit: Option<u32>,

    /// Bound on the initial chain id query (default: 10).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Percentage added on top of the node's gas estimate (default: 0).
    #[serde(default)]
    pub gas_limit_margin_percent: u64,

    /// Delay between receipt polls in milliseconds (default: 500).
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,

    /// Default receipt deadline in seconds (default: 30).
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

impl ChainClientConfig {
    /// Creates a configuration for `rpc_url` with every other field defaulted.
    #[must_use]
    pub const fn new(rpc_url: Url) -> Self {
        Self {
            rpc_url,
            chain_id: None,
            rate_limit: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            gas_limit_margin_percent: 0,
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
        }
    }

    /// Sets the expected chain id.
    #[must_use]
    pub const fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Bound on the initial chain id query.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Delay between receipt polls.
    #[must_use]
    pub const fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    /// Default receipt deadline.
    #[must_use]
    pub const fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

/// Settings for the exact-scheme facilitator on one EVM network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilitatorConfig {
    /// CAIP-2 network served. Derived from the chain id when absent.
    #[serde(default)]
    pub network: Option<String>,

    /// Chain connection.
    pub chain: ChainClientConfig,

    /// Hex private key of the settlement account.
    #[serde(default)]
    pub signer_private_key: Option<String>,

    /// Seconds of clock skew tolerated on `validAfter` (default: 30).
    #[serde(default = "default_clock_skew_tolerance_secs")]
    pub clock_skew_tolerance_secs: u64,

    /// Whether settlement waits for the receipt (default: true).
    #[serde(default = "default_wait_for_receipt")]
    pub wait_for_receipt: bool,
}

impl FacilitatorConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not valid configuration.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Builds the key-backed signer described by `signer_private_key`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::NotConfigured`] when no key is set and
    /// [`SigningError::InvalidKey`] when it cannot be parsed.
    pub fn signer(&self) -> Result<DigestSigner, SigningError> {
        DigestSigner::select(None, self.signer_private_key.as_deref())
    }
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

const fn default_receipt_poll_interval_ms() -> u64 {
    500
}

const fn default_receipt_timeout_secs() -> u64 {
    30
}

const fn default_clock_skew_tolerance_secs() -> u64 {
    30
}

const fn default_wait_for_receipt() -> bool {
    true
}
