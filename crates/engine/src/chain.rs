//! Chain client capability interface and JSON-RPC implementation
//!
//! Each chain the engine talks to is represented by one `ChainClient`
//! resolved once at startup into a `ChainRegistry`. The concrete client is
//! a minimal JSON-RPC-over-HTTP implementation covering only the methods
//! the engine actually needs, avoiding a per-chain SDK dependency chain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use omnilaunch_types::{EngineError, EngineResult};

/// Receipt polling cadence
const RECEIPT_POLL_INTERVAL_MS: u64 = 1_000;

/// Give up waiting for a receipt after this many polls
const RECEIPT_MAX_POLLS: u32 = 30;

// ============================================================================
// Capability Interface
// ============================================================================

/// Transaction submission request
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    /// Sending account (node-managed signer)
    pub from: String,

    /// Destination contract
    pub to: String,

    /// Native value to attach
    pub value: Decimal,

    /// Hex-encoded calldata
    pub data: Option<String>,
}

/// Mined transaction receipt
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub success: bool,
    pub block_number: u64,
}

/// Event log query filter
#[derive(Debug, Clone, PartialEq)]
pub struct EventFilter {
    /// Emitting contract address
    pub address: String,

    /// First topic to match
    pub topic: String,

    /// Lower block bound; None means latest window
    pub from_block: Option<u64>,
}

/// One matched event log
#[derive(Debug, Clone, PartialEq)]
pub struct EventLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub tx_hash: String,
    pub block_number: u64,
}

/// Per-chain capability interface resolved once at startup
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain identifier this client serves
    fn chain_id(&self) -> &str;

    /// Native balance of an account
    async fn get_balance(&self, address: &str) -> EngineResult<Decimal>;

    /// Deployed bytecode at an address ("0x" when none)
    async fn get_code(&self, address: &str) -> EngineResult<String>;

    /// Submit a transaction, returning its hash
    async fn send_transaction(&self, tx: TransactionRequest) -> EngineResult<String>;

    /// Block until the transaction is mined
    async fn wait_for_receipt(&self, tx_hash: &str) -> EngineResult<TransactionReceipt>;

    /// Query event logs by contract address and topic filter
    async fn query_events(&self, filter: EventFilter) -> EngineResult<Vec<EventLog>>;
}

// ============================================================================
// Registry
// ============================================================================

/// Maps chain identifiers to their capability interface
#[derive(Clone, Default)]
pub struct ChainRegistry {
    clients: HashMap<String, Arc<dyn ChainClient>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own chain id
    pub fn register(&mut self, client: Arc<dyn ChainClient>) {
        self.clients.insert(client.chain_id().to_string(), client);
    }

    /// Resolve a chain id to its client
    pub fn get(&self, chain_id: &str) -> EngineResult<Arc<dyn ChainClient>> {
        self.clients
            .get(chain_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownChain {
                chain: chain_id.to_string(),
            })
    }

    /// Whether a chain is registered
    pub fn contains(&self, chain_id: &str) -> bool {
        self.clients.contains_key(chain_id)
    }

    /// All registered chain ids, sorted
    pub fn chain_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.clients.keys().cloned().collect();
        ids.sort();
        ids
    }
}

// ============================================================================
// JSON-RPC Client
// ============================================================================

/// RPC response wrapper
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// RPC error structure
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Receipt payload from the node
#[derive(Debug, Deserialize)]
struct RawReceipt {
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
    status: Option<String>,
    #[serde(rename = "blockNumber")]
    block_number: Option<String>,
}

/// Log payload from the node
#[derive(Debug, Deserialize)]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
    #[serde(rename = "blockNumber")]
    block_number: Option<String>,
}

/// Minimal JSON-RPC client for one chain
pub struct JsonRpcChainClient {
    chain_id: String,
    url: String,
    agent: ureq::Agent,
}

impl JsonRpcChainClient {
    /// Create a new client for one chain endpoint
    pub fn new(chain_id: &str, url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .build();

        Self {
            chain_id: chain_id.to_string(),
            url: url.to_string(),
            agent,
        }
    }

    /// Make a JSON-RPC call
    async fn call<T>(&self, method: &str, params: Value) -> EngineResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        debug!("RPC call on {}: {} {:?}", self.chain_id, method, params);

        // ureq is sync; run it off the async executor
        let chain = self.chain_id.clone();
        let response_body = tokio::task::spawn_blocking({
            let agent = self.agent.clone();
            let url = self.url.clone();
            let body = request_body.to_string();

            move || -> Result<String, String> {
                let response = agent
                    .post(&url)
                    .set("Content-Type", "application/json")
                    .send_string(&body)
                    .map_err(|e| e.to_string())?;
                response.into_string().map_err(|e| e.to_string())
            }
        })
        .await
        .map_err(|e| EngineError::rpc_error(&chain, &e.to_string()))?
        .map_err(|e| EngineError::rpc_error(&chain, &e))?;

        let response: RpcResponse<T> = serde_json::from_str(&response_body)
            .map_err(|e| EngineError::rpc_error(&chain, &format!("malformed response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(EngineError::rpc_error(
                &chain,
                &format!("rpc error {}: {}", error.code, error.message),
            ));
        }

        response
            .result
            .ok_or_else(|| EngineError::rpc_error(&chain, "empty result"))
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    async fn get_balance(&self, address: &str) -> EngineResult<Decimal> {
        let hex: String = self
            .call("eth_getBalance", json!([address, "latest"]))
            .await?;
        let units = parse_hex_quantity(&self.chain_id, &hex)?;
        Decimal::from_u128(units)
            .ok_or_else(|| EngineError::invalid_decimal("balance", &hex))
    }

    async fn get_code(&self, address: &str) -> EngineResult<String> {
        self.call("eth_getCode", json!([address, "latest"])).await
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> EngineResult<String> {
        let value = decimal_to_hex(tx.value)?;
        let mut payload = json!({
            "from": tx.from,
            "to": tx.to,
            "value": value,
        });
        if let Some(data) = tx.data {
            payload["data"] = json!(data);
        }

        self.call("eth_sendTransaction", json!([payload])).await
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> EngineResult<TransactionReceipt> {
        for _ in 0..RECEIPT_MAX_POLLS {
            let receipt: Option<RawReceipt> = self
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await
                .ok()
                .flatten();

            if let Some(raw) = receipt {
                let block_number = raw
                    .block_number
                    .as_deref()
                    .map(|h| parse_hex_quantity(&self.chain_id, h))
                    .transpose()?
                    .unwrap_or(0) as u64;

                return Ok(TransactionReceipt {
                    tx_hash: raw.transaction_hash,
                    success: raw.status.as_deref() == Some("0x1"),
                    block_number,
                });
            }

            tokio::time::sleep(Duration::from_millis(RECEIPT_POLL_INTERVAL_MS)).await;
        }

        Err(EngineError::transaction_failed(
            &self.chain_id,
            Some(tx_hash.to_string()),
            "receipt not found before timeout",
        ))
    }

    async fn query_events(&self, filter: EventFilter) -> EngineResult<Vec<EventLog>> {
        let mut params = json!({
            "address": filter.address,
            "topics": [filter.topic],
        });
        if let Some(from_block) = filter.from_block {
            params["fromBlock"] = json!(format!("0x{:x}", from_block));
        }

        let raw: Vec<RawLog> = self.call("eth_getLogs", json!([params])).await?;

        raw.into_iter()
            .map(|log| {
                let block_number = log
                    .block_number
                    .as_deref()
                    .map(|h| parse_hex_quantity(&self.chain_id, h))
                    .transpose()?
                    .unwrap_or(0) as u64;

                Ok(EventLog {
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                    tx_hash: log.transaction_hash,
                    block_number,
                })
            })
            .collect()
    }
}

// ============================================================================
// Hex Helpers
// ============================================================================

/// Parse a "0x"-prefixed hex quantity
fn parse_hex_quantity(chain: &str, hex: &str) -> EngineResult<u128> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    u128::from_str_radix(digits, 16)
        .map_err(|e| EngineError::rpc_error(chain, &format!("bad hex quantity '{}': {}", hex, e)))
}

/// Encode a whole-unit decimal as a hex quantity
fn decimal_to_hex(value: Decimal) -> EngineResult<String> {
    let units = value
        .trunc()
        .to_u128()
        .ok_or_else(|| EngineError::invalid_decimal("value", &value.to_string()))?;
    Ok(format!("0x{:x}", units))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_quantity() {
        assert_eq!(parse_hex_quantity("c", "0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("c", "0xde0b6b3a7640000").unwrap(), 1_000_000_000_000_000_000);
        assert!(parse_hex_quantity("c", "0xzz").is_err());
    }

    #[test]
    fn test_decimal_to_hex_truncates_fractional_part() {
        assert_eq!(decimal_to_hex(Decimal::from(255)).unwrap(), "0xff");
        assert_eq!(decimal_to_hex(Decimal::new(2555, 1)).unwrap(), "0xff");
        assert!(decimal_to_hex(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_registry_resolution() {
        let mut registry = ChainRegistry::new();
        registry.register(Arc::new(JsonRpcChainClient::new(
            "ethereum",
            "http://127.0.0.1:8545",
        )));

        assert!(registry.contains("ethereum"));
        assert!(registry.get("ethereum").is_ok());
        assert!(matches!(
            registry.get("unknown"),
            Err(EngineError::UnknownChain { .. })
        ));
        assert_eq!(registry.chain_ids(), vec!["ethereum"]);
    }
}
