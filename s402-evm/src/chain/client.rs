//! JSON-RPC chain client.
//!
//! [`ChainClient`] owns one RPC connection and the chain id discovered when
//! it connected. It covers reads (contract calls, balances, code), the write
//! path (nonce, gas price and gas estimate into a [`TransactionIntent`],
//! signing through a [`DigestSigner`], raw broadcast) and receipt polling.
//!
//! # Concurrency
//!
//! Reads may run with unbounded concurrency. Writes from the same address must
//! be serialized by the caller: hold [`ChainClient::write_locks`] for that
//! address from [`prepare_transaction`](ChainClient::prepare_transaction)
//! through [`submit`](ChainClient::submit), or around
//! [`send_transaction`](ChainClient::send_transaction). The client never
//! retries a submission on its own.

use std::sync::Arc;
use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEnvelope};
use alloy_dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_eips::eip2718::Encodable2718;
use alloy_json_abi::{Function, JsonAbi};
use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::TransactionRequest;
use alloy_sol_types::SolCall;
use alloy_transport::layers::ThrottleLayer;
use alloy_transport_http::Http;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
#[cfg(feature = "telemetry")]
use tracing::instrument;
use url::Url;

use crate::chain::contract::IERC20;
use crate::chain::error::{ChainError, RpcError, RpcErrorKind, TimeoutError};
use crate::chain::lock::WriteLocks;
use crate::chain::types::{ChainId, TransactionIntent, TransactionReceipt};
use crate::config::ChainClientConfig;
use crate::signer::{DigestSigner, SigningError};

macro_rules! traced {
    ($fut:expr, $span:expr) => {{
        #[cfg(feature = "telemetry")]
        {
            use tracing::Instrument;
            $fut.instrument($span).await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            $fut.await
        }
    }};
}

/// Creates an RPC client for an HTTP(S) endpoint with an optional rate limit.
///
/// # Errors
///
/// Returns [`ChainError::UnsupportedEndpoint`] for non-HTTP(S) URLs.
pub fn rpc_client(endpoint: &Url, rate_limit: Option<u32>) -> Result<RpcClient, ChainError> {
    let scheme = endpoint.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ChainError::UnsupportedEndpoint(endpoint.to_string()));
    }
    #[cfg(feature = "telemetry")]
    tracing::debug!(rpc_url = %endpoint, rate_limit = ?rate_limit, "Using HTTP transport");
    let limit = rate_limit.unwrap_or(u32::MAX);
    let transport = ServiceBuilder::new()
        .layer(ThrottleLayer::new(limit))
        .service(Http::new(endpoint.clone()));
    Ok(RpcClient::new(transport, false))
}

/// Parses a JSON ABI document.
///
/// # Errors
///
/// Returns [`ChainError::Abi`] when the JSON is not a valid ABI.
pub fn parse_abi(json: &str) -> Result<JsonAbi, ChainError> {
    serde_json::from_str(json).map_err(|e| ChainError::Abi(e.to_string()))
}

fn select_function<'a>(
    abi: &'a JsonAbi,
    name: &str,
    arity: usize,
) -> Result<&'a Function, ChainError> {
    let overloads = abi
        .function(name)
        .ok_or_else(|| ChainError::Abi(format!("function `{name}` not found")))?;
    overloads
        .iter()
        .find(|f| f.inputs.len() == arity)
        .ok_or_else(|| ChainError::Abi(format!("no `{name}` overload takes {arity} arguments")))
}

fn encode_call<'a>(
    abi: &'a JsonAbi,
    function: &str,
    args: &[DynSolValue],
) -> Result<(&'a Function, Bytes), ChainError> {
    let func = select_function(abi, function, args.len())?;
    let input = func
        .abi_encode_input(args)
        .map_err(|e| ChainError::Abi(e.to_string()))?;
    Ok((func, input.into()))
}

const fn with_margin(estimate: u64, percent: u64) -> u64 {
    estimate.saturating_add(estimate.saturating_mul(percent) / 100)
}

/// RPC access and transaction lifecycle for one EVM chain.
pub struct ChainClient {
    provider: RootProvider,
    chain_id: ChainId,
    config: ChainClientConfig,
    signer: Option<Arc<DigestSigner>>,
    write_locks: WriteLocks,
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("rpc_url", &self.config.rpc_url.as_str())
            .field("chain_id", &self.chain_id)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl ChainClient {
    /// Connects to `config.rpc_url` and discovers its chain id.
    ///
    /// The chain id query is bounded by `connect_timeout_secs`. Connecting
    /// again with the same configuration yields an equivalent client.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Rpc`] with [`RpcErrorKind::Timeout`] when the node
    /// does not answer in time, [`ChainError::ChainIdMismatch`] when
    /// `config.chain_id` is set and differs from the node's, and
    /// [`ChainError::UnsupportedEndpoint`] for non-HTTP(S) URLs.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(rpc_url = %config.rpc_url)))]
    pub async fn connect(config: ChainClientConfig) -> Result<Self, ChainError> {
        let provider = RootProvider::new(rpc_client(&config.rpc_url, config.rate_limit)?);
        let timeout = config.connect_timeout();
        let actual = tokio::time::timeout(timeout, provider.get_chain_id())
            .await
            .map_err(|_| {
                RpcError::new(
                    RpcErrorKind::Timeout,
                    format!("no chain id within {timeout:?}"),
                )
            })??;
        if let Some(expected) = config.chain_id
            && expected != actual
        {
            return Err(ChainError::ChainIdMismatch { expected, actual });
        }
        #[cfg(feature = "telemetry")]
        tracing::info!(chain_id = actual, "Connected to chain");
        Ok(Self {
            provider,
            chain_id: actual,
            config,
            signer: None,
            write_locks: WriteLocks::new(),
        })
    }

    /// Connects to `endpoint` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::UnsupportedEndpoint`] when `endpoint` is not a
    /// URL, otherwise see [`connect`](Self::connect).
    pub async fn connect_url(
        endpoint: &str,
        expected_chain_id: Option<ChainId>,
    ) -> Result<Self, ChainError> {
        let url = Url::parse(endpoint)
            .map_err(|e| ChainError::UnsupportedEndpoint(format!("{endpoint}: {e}")))?;
        let mut config = ChainClientConfig::new(url);
        config.chain_id = expected_chain_id;
        Self::connect(config).await
    }

    /// Attaches the signer used for writes.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<DigestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Shares the per-address write locks with another client.
    #[must_use]
    pub fn with_write_locks(mut self, write_locks: WriteLocks) -> Self {
        self.write_locks = write_locks;
        self
    }

    /// Releases the connection.
    pub fn close(self) {
        #[cfg(feature = "telemetry")]
        tracing::debug!(chain_id = self.chain_id, "Closing chain client");
        drop(self);
    }

    /// The chain id reported by the node at connect time.
    #[must_use]
    pub const fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// The client configuration.
    #[must_use]
    pub const fn config(&self) -> &ChainClientConfig {
        &self.config
    }

    /// The attached signer, if any.
    #[must_use]
    pub fn signer(&self) -> Option<&Arc<DigestSigner>> {
        self.signer.as_ref()
    }

    /// Addresses the attached signer signs for. Empty without a signer.
    #[must_use]
    pub fn signer_addresses(&self) -> Vec<Address> {
        self.signer
            .as_ref()
            .map(|s| s.addresses().to_vec())
            .unwrap_or_default()
    }

    /// Per-address locks callers hold across a write.
    #[must_use]
    pub const fn write_locks(&self) -> &WriteLocks {
        &self.write_locks
    }

    fn require_signer(&self) -> Result<&DigestSigner, ChainError> {
        self.signer.as_deref().ok_or(ChainError::NoSigner)
    }

    /// Executes a read-only `eth_call`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Rpc`] when the node fails or the call reverts.
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default().with_to(to).with_input(data);
        Ok(self.provider.call(request).await?)
    }

    /// Calls a view function described by `abi` and decodes its outputs.
    ///
    /// The overload is chosen by name and argument count.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Abi`] when the function is missing, the arguments
    /// do not match its inputs or the return data does not decode, and
    /// [`ChainError::Rpc`] when the call fails.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(address = %address, function = %function)))]
    pub async fn read_contract(
        &self,
        address: Address,
        abi: &JsonAbi,
        function: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, ChainError> {
        let (func, input) = encode_call(abi, function, args)?;
        let output = self.call(address, input).await?;
        func.abi_decode_output(&output)
            .map_err(|e| ChainError::Abi(e.to_string()))
    }

    /// Fetches the pending nonce, gas price and gas estimate for a transaction.
    ///
    /// The gas estimate is raised by `gas_limit_margin_percent`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Rpc`] when any of the three queries fails. An
    /// estimate that reverts surfaces as [`RpcErrorKind::Reverted`].
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(from = %from, to = %to)))]
    pub async fn prepare_transaction(
        &self,
        from: Address,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<TransactionIntent, ChainError> {
        let nonce = traced!(
            self.provider.get_transaction_count(from).pending().into_future(),
            tracing::info_span!("get_pending_nonce", %from)
        )?;
        let gas_price = traced!(
            self.provider.get_gas_price().into_future(),
            tracing::info_span!("get_gas_price")
        )?;
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_value(value)
            .with_input(data.clone());
        let estimate = traced!(
            self.provider.estimate_gas(request).into_future(),
            tracing::info_span!("estimate_gas")
        )?;
        let intent = TransactionIntent {
            from,
            to,
            value,
            data,
            nonce,
            gas_price,
            gas_limit: with_margin(estimate, self.config.gas_limit_margin_percent),
            chain_id: self.chain_id,
        };
        #[cfg(feature = "telemetry")]
        tracing::debug!(
            nonce = intent.nonce,
            gas_price = intent.gas_price,
            gas_limit = intent.gas_limit,
            "Prepared transaction"
        );
        Ok(intent)
    }

    /// Signs `intent` and broadcasts it, returning the transaction hash
    /// without waiting for inclusion.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NoSigner`] without a signer,
    /// [`ChainError::Signing`] when the signer cannot sign for `intent.from`
    /// or fails, and [`ChainError::Rpc`] when the node rejects the
    /// transaction. Nonce and funding conflicts are not retryable.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(from = %intent.from, nonce = intent.nonce)))]
    pub async fn submit(&self, intent: TransactionIntent) -> Result<TxHash, ChainError> {
        let signer = self.require_signer()?;
        if !signer.addresses().contains(&intent.from) {
            return Err(SigningError::Backend(format!("signer cannot sign for {}", intent.from)).into());
        }
        let tx = intent.to_legacy();
        let digest = tx.signature_hash();
        let signature = signer.sign(&digest).await?;
        let recovered = signature
            .recover_address_from_prehash(&digest)
            .map_err(|e| SigningError::MalformedSignature(e.to_string()))?;
        if recovered != intent.from {
            return Err(SigningError::MalformedSignature(format!(
                "signature recovers to {recovered}, expected {}",
                intent.from
            ))
            .into());
        }
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        let raw = envelope.encoded_2718();
        let pending = traced!(
            self.provider.send_raw_transaction(&raw).into_future(),
            tracing::info_span!("send_raw_transaction", otel.kind = "client")
        )?;
        let tx_hash = *pending.tx_hash();
        #[cfg(feature = "telemetry")]
        tracing::info!(%tx_hash, "Transaction broadcast");
        Ok(tx_hash)
    }

    /// Sends `data` to `to` from the signer's primary address.
    ///
    /// # Errors
    ///
    /// See [`prepare_transaction`](Self::prepare_transaction) and [`submit`](Self::submit).
    pub async fn send_transaction(&self, to: Address, data: Bytes) -> Result<TxHash, ChainError> {
        let from = self.require_signer()?.address()?;
        let intent = self.prepare_transaction(from, to, U256::ZERO, data).await?;
        self.submit(intent).await
    }

    /// Encodes a call to `function` and sends it as a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Abi`] when the call cannot be encoded, otherwise
    /// see [`send_transaction`](Self::send_transaction).
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(address = %address, function = %function)))]
    pub async fn write_contract(
        &self,
        address: Address,
        abi: &JsonAbi,
        function: &str,
        args: &[DynSolValue],
    ) -> Result<TxHash, ChainError> {
        let (_, input) = encode_call(abi, function, args)?;
        self.send_transaction(address, input).await
    }

    /// Polls for the receipt of `tx_hash` every `poll_interval` until it is
    /// mined, `deadline` elapses or `cancel` fires.
    ///
    /// Nothing is spawned: when this returns, no polling continues.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Timeout`] on deadline, [`ChainError::Cancelled`]
    /// on cancellation and [`ChainError::Rpc`] when a poll fails.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(tx_hash = %tx_hash)))]
    pub async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        poll_interval: Duration,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<TransactionReceipt, ChainError> {
        let started = Instant::now();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ChainError::Cancelled),
            polled = tokio::time::timeout(deadline, self.poll_receipt(tx_hash, poll_interval)) => {
                polled.unwrap_or_else(|_| {
                    Err(TimeoutError {
                        tx_hash,
                        waited: started.elapsed(),
                    }
                    .into())
                })
            }
        }
    }

    /// [`wait_for_receipt`](Self::wait_for_receipt) with the configured
    /// poll interval and deadline.
    ///
    /// # Errors
    ///
    /// See [`wait_for_receipt`](Self::wait_for_receipt).
    pub async fn wait_for_receipt_default(
        &self,
        tx_hash: TxHash,
        cancel: &CancellationToken,
    ) -> Result<TransactionReceipt, ChainError> {
        self.wait_for_receipt(
            tx_hash,
            self.config.receipt_poll_interval(),
            self.config.receipt_timeout(),
            cancel,
        )
        .await
    }

    async fn poll_receipt(
        &self,
        tx_hash: TxHash,
        poll_interval: Duration,
    ) -> Result<TransactionReceipt, ChainError> {
        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
                return Ok(TransactionReceipt {
                    status: u64::from(receipt.status()),
                    block_number: receipt.block_number.unwrap_or_default(),
                    transaction_hash: receipt.transaction_hash,
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Native balance when `token` is `None` or the zero address, otherwise
    /// the ERC-20 `balanceOf` of `address` on `token`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Rpc`] when the query fails and
    /// [`ChainError::Abi`] when the token returns malformed data.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(address = %address, token = ?token)))]
    pub async fn get_balance(
        &self,
        address: Address,
        token: Option<Address>,
    ) -> Result<U256, ChainError> {
        match token.filter(|t| !t.is_zero()) {
            None => Ok(self.provider.get_balance(address).await?),
            Some(token) => {
                let call = IERC20::balanceOfCall { account: address };
                let output = self.call(token, call.abi_encode().into()).await?;
                IERC20::balanceOfCall::abi_decode_returns(&output)
                    .map_err(|e| ChainError::Abi(e.to_string()))
            }
        }
    }

    /// Deployed bytecode at `address`. Empty for externally owned accounts.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Rpc`] when the query fails.
    pub async fn get_code(&self, address: Address) -> Result<Bytes, ChainError> {
        Ok(self.provider.get_code_at(address).await?)
    }
}
