//! Liquidity rebalancing across chains
//!
//! Decides when and how much collateral to move between chains and drives
//! the cross-chain transfer through a request/fulfillment handshake:
//! a request transaction on the target chain opens the transfer, a funding
//! transaction on the source chain fulfills it, and a destination-side
//! event confirms delivery. Chain-client failures never escape this module
//! as errors; they surface as `BridgeOutcome { success: false }` and the
//! next scheduler tick retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use rust_decimal::Decimal;

use omnilaunch_types::{
    BridgeOutcome, EngineError, EngineResult, LiquidityRequest, LiquidityRequestStatus,
    RebalanceOutcome,
};

use crate::chain::{ChainClient, ChainRegistry, EventFilter, TransactionRequest, TransactionReceipt};
use crate::config::{ChainSettings, EngineConfig, RetryConfig};
use crate::reserve::ReserveMonitor;
use crate::store::DeploymentStore;

/// Orchestrates reserve rebalancing over the bridge handshake
pub struct LiquidityRebalancer {
    store: Arc<dyn DeploymentStore>,
    registry: Arc<ChainRegistry>,
    monitor: ReserveMonitor,
    chain_settings: HashMap<String, ChainSettings>,
    retry: RetryConfig,
    dry_run: bool,
}

impl LiquidityRebalancer {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        registry: Arc<ChainRegistry>,
        config: &EngineConfig,
        dry_run: bool,
    ) -> Self {
        let chain_settings = config
            .chains
            .iter()
            .map(|c| (c.chain_id.clone(), c.clone()))
            .collect();

        Self {
            monitor: ReserveMonitor::new(store.clone()),
            store,
            registry,
            chain_settings,
            retry: config.retry.clone(),
            dry_run,
        }
    }

    // ========================================================================
    // Rebalance Decision
    // ========================================================================

    /// Scan reserve health and trigger at most one transfer
    ///
    /// Deficit chains are matched against surplus chains in snapshot order;
    /// the first surplus whose excess covers the deficit's shortfall funds
    /// it. Remaining deficits wait for subsequent scheduler ticks.
    pub async fn check_and_rebalance(&self, token_id: &str) -> EngineResult<RebalanceOutcome> {
        let snapshots = self.monitor.monitor_reserves(token_id).await?;

        let deficits: Vec<_> = snapshots.iter().filter(|s| s.is_deficit()).collect();
        if deficits.is_empty() {
            return Ok(RebalanceOutcome::NoAction {
                reason: "all chains hold sufficient reserves".to_string(),
            });
        }

        let surpluses: Vec<_> = snapshots.iter().filter(|s| s.is_surplus()).collect();

        for deficit in &deficits {
            let shortfall = deficit.shortfall();
            if shortfall.is_zero() {
                continue;
            }

            for surplus in &surpluses {
                if surplus.excess() < shortfall {
                    continue;
                }

                info!(
                    "Rebalancing {}: moving {} from {} to {} ({:?})",
                    token_id, shortfall, surplus.chain_id, deficit.chain_id, deficit.status
                );

                if self.dry_run {
                    info!(
                        "DRY RUN: would bridge {} from {} to {} for {}",
                        shortfall, surplus.chain_id, deficit.chain_id, token_id
                    );
                    return Ok(RebalanceOutcome::Rebalanced {
                        source_chain: surplus.chain_id.clone(),
                        target_chain: deficit.chain_id.clone(),
                        amount: shortfall,
                        request_id: "dry-run".to_string(),
                    });
                }

                let requested = self
                    .request_liquidity(token_id, &deficit.chain_id, shortfall)
                    .await?;
                if !requested.success {
                    return Ok(RebalanceOutcome::NoAction {
                        reason: format!("liquidity request failed: {}", requested.message),
                    });
                }
                let request_id = requested
                    .request_id
                    .ok_or_else(|| EngineError::generic("request succeeded without an id"))?;

                let executed = self
                    .execute_bridge(
                        token_id,
                        &surplus.chain_id,
                        &deficit.chain_id,
                        shortfall,
                        &request_id,
                    )
                    .await?;
                if !executed.success {
                    return Ok(RebalanceOutcome::NoAction {
                        reason: format!("bridge execution failed: {}", executed.message),
                    });
                }

                // At most one rebalance action per invocation
                return Ok(RebalanceOutcome::Rebalanced {
                    source_chain: surplus.chain_id.clone(),
                    target_chain: deficit.chain_id.clone(),
                    amount: shortfall,
                    request_id,
                });
            }
        }

        Ok(RebalanceOutcome::NoAction {
            reason: "no surplus chain covers any shortfall".to_string(),
        })
    }

    // ========================================================================
    // Bridge Handshake
    // ========================================================================

    /// Open a liquidity request on the target chain's bridge contract
    ///
    /// The request id comes from the bridge's request event; when the event
    /// is not recoverable the transaction hash stands in for it.
    pub async fn request_liquidity(
        &self,
        token_id: &str,
        target_chain: &str,
        amount: Decimal,
    ) -> EngineResult<BridgeOutcome> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::invalid_parameter(
                "amount",
                &amount.to_string(),
                "positive",
            ));
        }

        let deployment = self
            .store
            .get_deployment(token_id, target_chain)
            .await?
            .ok_or_else(|| EngineError::DeploymentNotFound {
                token: token_id.to_string(),
                chain: target_chain.to_string(),
            })?;

        let Some((settings, bridge_address)) = self.bridge_route(target_chain, &deployment.bridge_address)
        else {
            // Development/partial-deployment fallback: no real bridge, the
            // request exists only in the store.
            let request_id = format!(
                "local-{}-{}-{}",
                token_id,
                target_chain,
                Utc::now().timestamp_millis()
            );
            warn!(
                "No bridge configured for {} on {}; recording local-only request {} (no on-chain transfer)",
                token_id, target_chain, request_id
            );
            let request = LiquidityRequest::new(&request_id, token_id, target_chain, amount);
            self.store.put_liquidity_request(request).await?;
            return Ok(BridgeOutcome::ok(
                "local fallback request recorded; no on-chain transfer",
                Some(request_id),
                None,
            ));
        };

        let client = self.registry.get(target_chain)?;
        let signer = settings.signer_address.clone().unwrap_or_default();
        let tx = TransactionRequest {
            from: signer,
            to: bridge_address.clone(),
            value: Decimal::ZERO,
            data: Some(request_payload(&deployment.token_address, amount)),
        };

        let receipt = match self.submit_with_retry(&client, tx).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(
                    "Liquidity request on {} for {} failed: {}",
                    target_chain, token_id, e
                );
                return Ok(BridgeOutcome::failed(&e.to_string()));
            }
        };

        let request_id = self
            .recover_request_id(&client, &settings, &bridge_address, &receipt)
            .await;

        let request = LiquidityRequest::new(&request_id, token_id, target_chain, amount);
        self.store.put_liquidity_request(request).await?;

        info!(
            "Opened liquidity request {} for {} on {} (tx {})",
            request_id, token_id, target_chain, receipt.tx_hash
        );

        Ok(BridgeOutcome::ok(
            "liquidity requested",
            Some(request_id),
            Some(receipt.tx_hash),
        ))
    }

    /// Fund an open request from the source chain and update reserves
    ///
    /// The target chain's reserve is credited as soon as the funding
    /// transaction lands on the source chain, before the destination-side
    /// message settles: a fresh reserve figure is worth more here than
    /// strict settlement ordering, and `confirm_bridge_delivery` closes the
    /// loop later.
    pub async fn execute_bridge(
        &self,
        token_id: &str,
        source_chain: &str,
        target_chain: &str,
        amount: Decimal,
        request_id: &str,
    ) -> EngineResult<BridgeOutcome> {
        // Replays of a request that already moved past pending are no-ops
        if let Some(existing) = self.store.get_liquidity_request(request_id).await? {
            match existing.status {
                LiquidityRequestStatus::Bridging | LiquidityRequestStatus::Completed => {
                    return Ok(BridgeOutcome::ok(
                        "request already executed",
                        Some(request_id.to_string()),
                        None,
                    ));
                }
                LiquidityRequestStatus::Failed => {
                    return Ok(BridgeOutcome::failed("request already failed"));
                }
                LiquidityRequestStatus::Pending => {}
            }
        }

        let mut source = self
            .store
            .get_deployment(token_id, source_chain)
            .await?
            .ok_or_else(|| EngineError::DeploymentNotFound {
                token: token_id.to_string(),
                chain: source_chain.to_string(),
            })?;
        let mut target = self
            .store
            .get_deployment(token_id, target_chain)
            .await?
            .ok_or_else(|| EngineError::DeploymentNotFound {
                token: token_id.to_string(),
                chain: target_chain.to_string(),
            })?;

        if source.local_reserve < amount {
            return Ok(BridgeOutcome::failed(&format!(
                "source chain {} holds {} but {} is needed",
                source_chain, source.local_reserve, amount
            )));
        }

        let route = self.bridge_route(source_chain, &source.bridge_address);
        let mut funding_tx = None;

        if let Some((settings, bridge_address)) = route {
            let client = match self.registry.get(source_chain) {
                Ok(client) => client,
                Err(e) => return Ok(BridgeOutcome::failed(&e.to_string())),
            };
            let signer = settings.signer_address.clone().unwrap_or_default();
            let tx = TransactionRequest {
                from: signer,
                to: bridge_address,
                value: amount,
                data: Some(funding_payload(request_id)),
            };

            match self.submit_with_retry(&client, tx).await {
                Ok(receipt) => funding_tx = Some(receipt.tx_hash),
                Err(e) => {
                    error!(
                        "Bridge execution {} -> {} for {} failed after retries: {}",
                        source_chain, target_chain, token_id, e
                    );
                    self.mark_request_failed(token_id, target_chain, amount, request_id)
                        .await?;
                    return Ok(BridgeOutcome::failed(&e.to_string()));
                }
            }
        } else {
            warn!(
                "No bridge configured for {} on {}; moving reserves in the store only (no on-chain transfer)",
                token_id, source_chain
            );
        }

        // Debit the source and optimistically credit the target
        source.local_reserve -= amount;
        source.updated_at = Utc::now();
        self.store.upsert_deployment(source).await?;

        target.local_reserve += amount;
        target.updated_at = Utc::now();
        self.store.upsert_deployment(target).await?;

        let now = Utc::now();
        let mut request = self
            .store
            .get_liquidity_request(request_id)
            .await?
            .unwrap_or_else(|| LiquidityRequest::new(request_id, token_id, target_chain, amount));
        request.source_chain = Some(source_chain.to_string());
        request.attempts = 0;
        request.updated_at = now;
        // The store-only fallback has no delivery to wait for
        request.status = if funding_tx.is_some() {
            LiquidityRequestStatus::Bridging
        } else {
            LiquidityRequestStatus::Completed
        };
        self.store.put_liquidity_request(request).await?;

        info!(
            "Bridged {} of {} from {} to {} (request {}, tx {:?})",
            amount, token_id, source_chain, target_chain, request_id, funding_tx
        );

        Ok(BridgeOutcome::ok(
            "bridge executed; target reserve credited",
            Some(request_id.to_string()),
            funding_tx,
        ))
    }

    /// Check the destination chain for the delivery event and settle the
    /// request
    ///
    /// A request that exhausts its confirmation attempts is marked failed
    /// and the optimistic target credit is reversed.
    pub async fn confirm_bridge_delivery(
        &self,
        token_id: &str,
        request_id: &str,
    ) -> EngineResult<BridgeOutcome> {
        let mut request = self
            .store
            .get_liquidity_request(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound {
                request_id: request_id.to_string(),
            })?;

        match request.status {
            LiquidityRequestStatus::Completed => {
                return Ok(BridgeOutcome::ok(
                    "delivery already confirmed",
                    Some(request_id.to_string()),
                    None,
                ));
            }
            LiquidityRequestStatus::Failed => {
                return Ok(BridgeOutcome::failed("request already failed"));
            }
            LiquidityRequestStatus::Pending => {
                return Ok(BridgeOutcome::failed("request has not been funded yet"));
            }
            LiquidityRequestStatus::Bridging => {}
        }

        let target_chain = request.target_chain.clone();
        let deployment = self
            .store
            .get_deployment(token_id, &target_chain)
            .await?
            .ok_or_else(|| EngineError::DeploymentNotFound {
                token: token_id.to_string(),
                chain: target_chain.clone(),
            })?;

        let delivered = match self.bridge_route(&target_chain, &deployment.bridge_address) {
            Some((settings, bridge_address)) => {
                let client = match self.registry.get(&target_chain) {
                    Ok(client) => client,
                    Err(e) => return Ok(BridgeOutcome::failed(&e.to_string())),
                };
                let filter = EventFilter {
                    address: bridge_address,
                    topic: settings.bridge_delivery_topic.clone(),
                    from_block: None,
                };
                match client.query_events(filter).await {
                    Ok(events) => events
                        .iter()
                        .any(|e| e.data.contains(request_id) || e.topics.iter().any(|t| t == request_id)),
                    Err(e) => {
                        warn!(
                            "Delivery query for request {} on {} failed: {}",
                            request_id, target_chain, e
                        );
                        return Ok(BridgeOutcome::failed(&e.to_string()));
                    }
                }
            }
            // Store-only requests complete in execute_bridge; reaching here
            // means the route was deconfigured mid-flight.
            None => true,
        };

        if delivered {
            request.status = LiquidityRequestStatus::Completed;
            request.updated_at = Utc::now();
            self.store.put_liquidity_request(request).await?;
            info!("Delivery confirmed for request {}", request_id);
            return Ok(BridgeOutcome::ok(
                "delivery confirmed",
                Some(request_id.to_string()),
                None,
            ));
        }

        request.attempts += 1;
        request.updated_at = Utc::now();

        if request.attempts >= self.retry.max_retries {
            error!(
                "Request {} exhausted {} delivery checks; reversing optimistic credit of {} on {}",
                request_id, request.attempts, request.amount, target_chain
            );
            let mut target = deployment;
            target.local_reserve -= request.amount;
            target.updated_at = Utc::now();
            self.store.upsert_deployment(target).await?;

            request.status = LiquidityRequestStatus::Failed;
            self.store.put_liquidity_request(request).await?;
            return Ok(BridgeOutcome::failed(
                "delivery not observed; request failed and optimistic credit reversed",
            ));
        }

        let attempts = request.attempts;
        self.store.put_liquidity_request(request).await?;
        Ok(BridgeOutcome::failed(&format!(
            "delivery not yet observed (attempt {}/{})",
            attempts, self.retry.max_retries
        )))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Resolve the bridge contract and signer for a chain, if configured
    fn bridge_route(
        &self,
        chain_id: &str,
        bridge_address: &Option<String>,
    ) -> Option<(&ChainSettings, String)> {
        let settings = self.chain_settings.get(chain_id)?;
        if !settings.can_submit() || !self.registry.contains(chain_id) {
            return None;
        }
        let bridge = bridge_address.clone()?;
        Some((settings, bridge))
    }

    /// Submit a transaction and wait for its receipt, with bounded
    /// exponential backoff between attempts
    async fn submit_with_retry(
        &self,
        client: &Arc<dyn ChainClient>,
        tx: TransactionRequest,
    ) -> EngineResult<TransactionReceipt> {
        let chain = client.chain_id().to_string();
        let mut attempt = 0;

        loop {
            let result = async {
                let tx_hash = client.send_transaction(tx.clone()).await?;
                let receipt = client.wait_for_receipt(&tx_hash).await?;
                if receipt.success {
                    Ok(receipt)
                } else {
                    Err(EngineError::transaction_failed(
                        &chain,
                        Some(receipt.tx_hash),
                        "transaction reverted",
                    ))
                }
            }
            .await;

            match result {
                Ok(receipt) => return Ok(receipt),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_retries {
                        return Err(e);
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        "Attempt {}/{} on {} failed ({}); retrying in {}ms",
                        attempt, self.retry.max_retries, chain, e, delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    /// Recover the externally-issued request id from the bridge's request
    /// event; the transaction hash stands in when no event matches
    async fn recover_request_id(
        &self,
        client: &Arc<dyn ChainClient>,
        settings: &ChainSettings,
        bridge_address: &str,
        receipt: &TransactionReceipt,
    ) -> String {
        let filter = EventFilter {
            address: bridge_address.to_string(),
            topic: settings.bridge_request_topic.clone(),
            from_block: Some(receipt.block_number),
        };

        match client.query_events(filter).await {
            Ok(events) => events
                .into_iter()
                .find(|e| e.tx_hash == receipt.tx_hash)
                .and_then(|e| {
                    if !e.data.is_empty() && e.data != "0x" {
                        Some(e.data)
                    } else {
                        e.topics.get(1).cloned()
                    }
                })
                .unwrap_or_else(|| receipt.tx_hash.clone()),
            Err(e) => {
                warn!(
                    "Request-id event query on {} failed ({}); falling back to tx hash",
                    settings.chain_id, e
                );
                receipt.tx_hash.clone()
            }
        }
    }

    /// Flag a request as failed after exhausted funding attempts
    async fn mark_request_failed(
        &self,
        token_id: &str,
        target_chain: &str,
        amount: Decimal,
        request_id: &str,
    ) -> EngineResult<()> {
        let mut request = self
            .store
            .get_liquidity_request(request_id)
            .await?
            .unwrap_or_else(|| LiquidityRequest::new(request_id, token_id, target_chain, amount));
        request.status = LiquidityRequestStatus::Failed;
        request.updated_at = Utc::now();
        self.store.put_liquidity_request(request).await
    }
}

// ============================================================================
// Payload Encoding
// ============================================================================

/// Opaque request payload; the bridge contract's wire format lives on-chain
fn request_payload(token_address: &str, amount: Decimal) -> String {
    hex_encode(format!("req:{}:{}", token_address, amount).as_bytes())
}

/// Opaque funding payload carrying the correlation key
fn funding_payload(request_id: &str) -> String {
    hex_encode(format!("fund:{}", request_id).as_bytes())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
