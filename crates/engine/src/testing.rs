//! Mock collaborators for tests and local development
//!
//! The mock chain records submitted transactions and serves canned
//! balances and event logs; the mock pool creator hands out sequential
//! pool addresses. Both can be switched into a failing mode to exercise
//! the engine's partial-failure handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use omnilaunch_types::{EngineError, EngineResult};

use crate::chain::{
    ChainClient, EventFilter, EventLog, TransactionReceipt, TransactionRequest,
};
use crate::graduation::{DexPoolCreator, PoolCreation};

// ============================================================================
// Mock Chain
// ============================================================================

#[derive(Clone)]
pub struct MockChainClient {
    chain_id: String,
    balances: Arc<RwLock<HashMap<String, Decimal>>>,
    submitted: Arc<RwLock<Vec<TransactionRequest>>>,
    events: Arc<RwLock<Vec<EventLog>>>,
    fail_submissions: Arc<RwLock<bool>>,
    tx_counter: Arc<AtomicU64>,
}

impl MockChainClient {
    pub fn new(chain_id: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            balances: Arc::new(RwLock::new(HashMap::new())),
            submitted: Arc::new(RwLock::new(Vec::new())),
            events: Arc::new(RwLock::new(Vec::new())),
            fail_submissions: Arc::new(RwLock::new(false)),
            tx_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn set_balance(&self, address: &str, balance: Decimal) {
        self.balances
            .write()
            .await
            .insert(address.to_string(), balance);
    }

    /// Queue an event log served to subsequent queries
    pub async fn push_event(&self, event: EventLog) {
        self.events.write().await.push(event);
    }

    /// Make every submission fail with an RPC error
    pub async fn set_fail_submissions(&self, fail: bool) {
        *self.fail_submissions.write().await = fail;
    }

    pub async fn submitted_transactions(&self) -> Vec<TransactionRequest> {
        self.submitted.read().await.clone()
    }

    /// Hash the next submission will receive
    pub fn next_tx_hash(&self) -> String {
        format!(
            "0x{}tx{}",
            self.chain_id,
            self.tx_counter.load(Ordering::SeqCst)
        )
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    async fn get_balance(&self, address: &str) -> EngineResult<Decimal> {
        Ok(self
            .balances
            .read()
            .await
            .get(address)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn get_code(&self, _address: &str) -> EngineResult<String> {
        Ok("0x".to_string())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> EngineResult<String> {
        if *self.fail_submissions.read().await {
            return Err(EngineError::rpc_error(&self.chain_id, "mock submission failure"));
        }

        let tx_hash = self.next_tx_hash();
        self.tx_counter.fetch_add(1, Ordering::SeqCst);
        self.submitted.write().await.push(tx);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> EngineResult<TransactionReceipt> {
        Ok(TransactionReceipt {
            tx_hash: tx_hash.to_string(),
            success: true,
            block_number: 1,
        })
    }

    async fn query_events(&self, filter: EventFilter) -> EngineResult<Vec<EventLog>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| {
                e.address == filter.address
                    && e.topics.first().map(|t| t.as_str()) == Some(filter.topic.as_str())
            })
            .cloned()
            .collect())
    }
}

// ============================================================================
// Mock Pool Creator
// ============================================================================

#[derive(Clone, Default)]
pub struct MockPoolCreator {
    created: Arc<RwLock<Vec<(String, String, Decimal, Decimal)>>>,
    fail: Arc<RwLock<bool>>,
    counter: Arc<AtomicU64>,
}

impl MockPoolCreator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every pool creation fail
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    /// How many pools were actually created
    pub async fn call_count(&self) -> usize {
        self.created.read().await.len()
    }

    pub async fn created_pools(&self) -> Vec<(String, String, Decimal, Decimal)> {
        self.created.read().await.clone()
    }
}

#[async_trait]
impl DexPoolCreator for MockPoolCreator {
    async fn create_pool(
        &self,
        chain_id: &str,
        token_address: &str,
        reserve_amount: Decimal,
        token_amount: Decimal,
    ) -> EngineResult<PoolCreation> {
        if *self.fail.read().await {
            return Err(EngineError::rpc_error(chain_id, "mock pool creation failure"));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.created.write().await.push((
            chain_id.to_string(),
            token_address.to_string(),
            reserve_amount,
            token_amount,
        ));

        Ok(PoolCreation {
            pool_address: format!("0xpool{}", n),
            tx_hash: format!("0xgradtx{}", n),
        })
    }
}
