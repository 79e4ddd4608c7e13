//! A scripted JSON-RPC node served over HTTP by `wiremock`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use alloy_consensus::TxEnvelope;
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{Address, B256, Bytes, TxHash, U256, hex, keccak256};
use serde_json::{Value, json};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::config::ChainClientConfig;

/// Block number reported in mined receipts.
pub const MINED_BLOCK: u64 = 42;

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A raw transaction received through `eth_sendRawTransaction`.
#[derive(Debug, Clone)]
pub struct SentTx {
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub chain_id: Option<u64>,
    pub input: Bytes,
}

#[derive(Debug)]
struct State {
    chain_id: u64,
    base_nonce: u64,
    gas_price: u128,
    gas_estimate: u64,
    native_balance: U256,
    response_delay: Duration,
    nonce_delay: Duration,
    mining_delay: Duration,
    receipt_status: u64,
    call_results: HashMap<[u8; 4], Bytes>,
    call_revert: Option<String>,
    code: HashMap<Address, Bytes>,
    send_error: Option<(i64, String)>,
    sent: Vec<SentTx>,
    mined: HashMap<TxHash, (Instant, Address, Option<Address>)>,
    calls: HashMap<String, usize>,
}

/// Shared handle to the scripted node.
#[derive(Clone)]
pub struct MockRpc {
    server: Arc<MockServer>,
    state: Arc<Mutex<State>>,
}

struct Responder {
    state: Arc<Mutex<State>>,
}

type RpcResult = Result<Value, (i64, String)>;

fn quantity(value: impl std::fmt::LowerHex) -> Value {
    Value::String(format!("0x{value:x}"))
}

fn call_input(params: &Value) -> Option<Vec<u8>> {
    let tx = params.get(0)?;
    let data = tx.get("input").or_else(|| tx.get("data"))?.as_str()?;
    hex::decode(data).ok()
}

fn address_param(params: &Value, index: usize) -> Option<Address> {
    params.get(index)?.as_str()?.parse().ok()
}

impl Responder {
    fn dispatch(state: &mut State, method: &str, params: &Value) -> (RpcResult, Duration) {
        let delay = state.response_delay;
        let result = match method {
            "eth_chainId" => Ok(quantity(state.chain_id)),
            "eth_blockNumber" => Ok(quantity(MINED_BLOCK)),
            "eth_gasPrice" => Ok(quantity(state.gas_price)),
            "eth_estimateGas" => Ok(quantity(state.gas_estimate)),
            "eth_getBalance" => Ok(quantity(state.native_balance)),
            "eth_getTransactionCount" => {
                let nonce = state.base_nonce + state.sent.len() as u64;
                return (Ok(quantity(nonce)), delay + state.nonce_delay);
            }
            "eth_getCode" => {
                let code = address_param(params, 0)
                    .and_then(|a| state.code.get(&a).cloned())
                    .unwrap_or_default();
                Ok(Value::String(code.to_string()))
            }
            "eth_call" => {
                if let Some(reason) = &state.call_revert {
                    Err((3, format!("execution reverted: {reason}")))
                } else {
                    let output = call_input(params)
                        .filter(|input| input.len() >= 4)
                        .and_then(|input| {
                            let selector: [u8; 4] = input[..4].try_into().ok()?;
                            state.call_results.get(&selector).cloned()
                        })
                        .unwrap_or_default();
                    Ok(Value::String(output.to_string()))
                }
            }
            "eth_sendRawTransaction" => Self::receive_raw(state, params),
            "eth_getTransactionReceipt" => {
                let hash: Option<TxHash> = params.get(0).and_then(|h| h.as_str()?.parse().ok());
                Ok(hash
                    .and_then(|hash| {
                        let (ready, from, to) = state.mined.get(&hash)?;
                        (Instant::now() >= *ready).then(|| receipt_json(hash, *from, *to, state))
                    })
                    .unwrap_or(Value::Null))
            }
            other => Err((-32601, format!("method {other} not found"))),
        };
        (result, delay)
    }

    fn receive_raw(state: &mut State, params: &Value) -> RpcResult {
        if let Some(err) = &state.send_error {
            return Err(err.clone());
        }
        let raw = params
            .get(0)
            .and_then(Value::as_str)
            .and_then(|s| hex::decode(s).ok())
            .ok_or((-32602, "invalid raw transaction".to_owned()))?;
        let envelope = TxEnvelope::decode_2718(&mut raw.as_slice())
            .map_err(|e| (-32602, e.to_string()))?;
        let signed = envelope
            .as_legacy()
            .ok_or((-32602, "expected a legacy transaction".to_owned()))?;
        let from = signed
            .signature()
            .recover_address_from_prehash(&signed.signature_hash())
            .map_err(|e| (-32602, e.to_string()))?;
        let tx = signed.tx();
        let hash = keccak256(&raw);
        let to = tx.to.to().copied();
        state.sent.push(SentTx {
            hash,
            from,
            to,
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            chain_id: tx.chain_id,
            input: tx.input.clone(),
        });
        state
            .mined
            .insert(hash, (Instant::now() + state.mining_delay, from, to));
        Ok(Value::String(hash.to_string()))
    }
}

fn receipt_json(hash: B256, from: Address, to: Option<Address>, state: &State) -> Value {
    json!({
        "type": "0x0",
        "status": quantity(state.receipt_status),
        "transactionHash": hash,
        "transactionIndex": "0x0",
        "blockHash": B256::repeat_byte(0x11),
        "blockNumber": quantity(MINED_BLOCK),
        "from": from,
        "to": to,
        "contractAddress": null,
        "cumulativeGasUsed": "0x5208",
        "gasUsed": "0x5208",
        "effectiveGasPrice": quantity(state.gas_price),
        "logs": [],
        "logsBloom": format!("0x{}", "00".repeat(256)),
    })
}

impl Respond for Responder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let id = body.get("id").cloned().unwrap_or(Value::Null);
        let method = body.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = body.get("params").cloned().unwrap_or(Value::Null);

        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method.to_owned()).or_default() += 1;
        let (result, delay) = Self::dispatch(&mut state, method, &params);
        drop(state);

        let payload = match result {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err((code, message)) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": code, "message": message },
            }),
        };
        ResponseTemplate::new(200)
            .set_body_json(payload)
            .set_delay(delay)
    }
}

impl MockRpc {
    /// Starts a node reporting `chain_id` with nonce 0, gas price 1 gwei and
    /// a 21000 gas estimate.
    pub async fn start(chain_id: u64) -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(Mutex::new(State {
            chain_id,
            base_nonce: 0,
            gas_price: 1_000_000_000,
            gas_estimate: 21_000,
            native_balance: U256::ZERO,
            response_delay: Duration::ZERO,
            nonce_delay: Duration::ZERO,
            mining_delay: Duration::ZERO,
            receipt_status: 1,
            call_results: HashMap::new(),
            call_revert: None,
            code: HashMap::new(),
            send_error: None,
            sent: Vec::new(),
            mined: HashMap::new(),
            calls: HashMap::new(),
        }));
        Mock::given(method("POST"))
            .respond_with(Responder {
                state: Arc::clone(&state),
            })
            .mount(&server)
            .await;
        Self {
            server: Arc::new(server),
            state,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Client configuration pointing at this node with short receipt polling.
    pub fn config(&self) -> ChainClientConfig {
        let mut config = ChainClientConfig::new(self.server.uri().parse().unwrap());
        config.receipt_poll_interval_ms = 20;
        config.receipt_timeout_secs = 5;
        config
    }

    pub fn set_base_nonce(&self, nonce: u64) {
        self.state().base_nonce = nonce;
    }

    pub fn set_gas_price(&self, gas_price: u128) {
        self.state().gas_price = gas_price;
    }

    pub fn set_gas_estimate(&self, gas: u64) {
        self.state().gas_estimate = gas;
    }

    pub fn set_native_balance(&self, balance: U256) {
        self.state().native_balance = balance;
    }

    /// Delays every response.
    pub fn set_response_delay(&self, delay: Duration) {
        self.state().response_delay = delay;
    }

    /// Delays nonce responses. The nonce itself is computed on arrival.
    pub fn set_nonce_delay(&self, delay: Duration) {
        self.state().nonce_delay = delay;
    }

    /// Time between broadcast and the receipt becoming visible.
    pub fn set_mining_delay(&self, delay: Duration) {
        self.state().mining_delay = delay;
    }

    /// Makes mined receipts report a revert.
    pub fn set_reverting_receipts(&self) {
        self.state().receipt_status = 0;
    }

    /// Answers `eth_call` for `selector` with `output`.
    pub fn set_call_result(&self, selector: impl Into<[u8; 4]>, output: impl Into<Bytes>) {
        self.state()
            .call_results
            .insert(selector.into(), output.into());
    }

    /// Makes every `eth_call` revert.
    pub fn revert_calls(&self, reason: &str) {
        self.state().call_revert = Some(reason.to_owned());
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        self.state().code.insert(address, code);
    }

    /// Rejects every raw transaction with a JSON-RPC error.
    pub fn fail_sends(&self, code: i64, message: &str) {
        self.state().send_error = Some((code, message.to_owned()));
    }

    /// Registers a transaction the node will report as mined after `delay`.
    pub fn mine_after(&self, hash: TxHash, delay: Duration) {
        self.state()
            .mined
            .insert(hash, (Instant::now() + delay, Address::ZERO, None));
    }

    /// Raw transactions received so far, in arrival order.
    pub fn sent(&self) -> Vec<SentTx> {
        self.state().sent.clone()
    }

    /// Number of requests received for `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.get(method).copied().unwrap_or(0)
    }
}
