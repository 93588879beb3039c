//! Engine facade
//!
//! `SyncEngine` owns the component set and exposes the operations consumed
//! by the API layer and trade-settlement logic. Mutating operations for the
//! same token are serialized through a keyed async mutex, so overlapping
//! scheduler ticks queue instead of racing on the same deployment rows.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use omnilaunch_types::{
    BridgeOutcome, EngineError, EngineResult, GraduationOutcome, GraduationStatus,
    PriceDeviation, PriceSync, RebalanceOutcome, ReserveCheck, ReserveSnapshot,
};

use crate::chain::ChainRegistry;
use crate::config::EngineConfig;
use crate::graduation::{DexPoolCreator, GraduationManager};
use crate::price::PriceSynchronizer;
use crate::rebalancer::LiquidityRebalancer;
use crate::reserve::ReserveMonitor;
use crate::store::DeploymentStore;
use crate::supply::SupplyAggregator;

/// Cross-chain virtual-liquidity synchronization engine
pub struct SyncEngine {
    store: Arc<dyn DeploymentStore>,
    registry: Arc<ChainRegistry>,
    config: EngineConfig,

    supply: SupplyAggregator,
    price: PriceSynchronizer,
    reserves: ReserveMonitor,
    rebalancer: LiquidityRebalancer,
    graduation: GraduationManager,

    /// Keyed mutexes serializing mutating work per token
    token_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncEngine {
    /// Create a new engine instance
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        registry: Arc<ChainRegistry>,
        pool_creator: Arc<dyn DexPoolCreator>,
        config: EngineConfig,
        dry_run: bool,
    ) -> Self {
        if dry_run {
            warn!("Engine running in DRY RUN mode - no transactions will be submitted");
        }

        Self {
            supply: SupplyAggregator::new(store.clone()),
            price: PriceSynchronizer::new(store.clone(), config.max_deviation_percent),
            reserves: ReserveMonitor::new(store.clone()),
            rebalancer: LiquidityRebalancer::new(store.clone(), registry.clone(), &config, dry_run),
            graduation: GraduationManager::new(
                store.clone(),
                pool_creator,
                config.retry.clone(),
                dry_run,
            ),
            store,
            registry,
            config,
            token_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lease for one token's mutating operations
    async fn token_lock(&self, token_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.token_locks.lock().await;
        locks
            .entry(token_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ========================================================================
    // Supply and Price
    // ========================================================================

    /// Overwrite one chain's local supply; returns the fresh global figure
    pub async fn update_local_supply(
        &self,
        token_id: &str,
        chain_id: &str,
        new_supply: Decimal,
    ) -> EngineResult<Decimal> {
        let lock = self.token_lock(token_id).await;
        let _guard = lock.lock().await;
        self.supply
            .update_local_supply(token_id, chain_id, new_supply)
            .await
    }

    /// Current global supply for a token
    pub async fn global_supply(&self, token_id: &str) -> EngineResult<Decimal> {
        self.supply.global_supply(token_id).await
    }

    /// Recompute the shared price and republish per-chain market caps
    pub async fn sync_price(&self, token_id: &str) -> EngineResult<PriceSync> {
        let lock = self.token_lock(token_id).await;
        let _guard = lock.lock().await;
        self.price.sync_price(token_id).await
    }

    /// Read-only cross-chain price dispersion diagnostic
    pub async fn check_price_deviation(&self, token_id: &str) -> EngineResult<PriceDeviation> {
        self.price.check_price_deviation(token_id).await
    }

    // ========================================================================
    // Reserves and Rebalancing
    // ========================================================================

    /// Snapshot every deployed chain's reserve health
    pub async fn monitor_reserves(&self, token_id: &str) -> EngineResult<Vec<ReserveSnapshot>> {
        self.reserves.monitor_reserves(token_id).await
    }

    /// Pre-sell sufficiency check for the trade-settlement collaborator
    pub async fn check_reserves(
        &self,
        token_id: &str,
        chain_id: &str,
        required_amount: Decimal,
    ) -> EngineResult<ReserveCheck> {
        self.reserves
            .check_reserves(token_id, chain_id, required_amount)
            .await
    }

    /// Scan reserve health and trigger at most one transfer
    pub async fn check_and_rebalance(&self, token_id: &str) -> EngineResult<RebalanceOutcome> {
        let lock = self.token_lock(token_id).await;
        let _guard = lock.lock().await;
        self.rebalancer.check_and_rebalance(token_id).await
    }

    /// Open a liquidity request on the target chain
    pub async fn request_liquidity(
        &self,
        token_id: &str,
        target_chain: &str,
        amount: Decimal,
    ) -> EngineResult<BridgeOutcome> {
        let lock = self.token_lock(token_id).await;
        let _guard = lock.lock().await;
        self.rebalancer
            .request_liquidity(token_id, target_chain, amount)
            .await
    }

    /// Fund an open request from the source chain
    pub async fn execute_bridge(
        &self,
        token_id: &str,
        source_chain: &str,
        target_chain: &str,
        amount: Decimal,
        request_id: &str,
    ) -> EngineResult<BridgeOutcome> {
        let lock = self.token_lock(token_id).await;
        let _guard = lock.lock().await;
        self.rebalancer
            .execute_bridge(token_id, source_chain, target_chain, amount, request_id)
            .await
    }

    /// Settle a bridging request against the destination chain's events
    pub async fn confirm_bridge_delivery(
        &self,
        token_id: &str,
        request_id: &str,
    ) -> EngineResult<BridgeOutcome> {
        let lock = self.token_lock(token_id).await;
        let _guard = lock.lock().await;
        self.rebalancer
            .confirm_bridge_delivery(token_id, request_id)
            .await
    }

    // ========================================================================
    // Graduation
    // ========================================================================

    /// Evaluate and drive graduation for every chain of a token
    pub async fn check_and_graduate(&self, token_id: &str) -> EngineResult<Vec<GraduationOutcome>> {
        let lock = self.token_lock(token_id).await;
        let _guard = lock.lock().await;
        self.graduation.check_and_graduate(token_id).await
    }

    /// Read-only graduation progress for one (token, chain)
    pub async fn check_graduation_status(
        &self,
        token_id: &str,
        chain_id: &str,
    ) -> EngineResult<GraduationStatus> {
        self.graduation.graduation_status(token_id, chain_id).await
    }

    /// Clear a parked graduation so it can be attempted again
    pub async fn reset_graduation_attempts(&self, token_id: &str, chain_id: &str) {
        self.graduation.reset_attempts(token_id, chain_id).await
    }

    // ========================================================================
    // Scheduler Entry Points
    // ========================================================================

    /// One monitoring pass over every token
    ///
    /// Within a token the ordering is price sync, then rebalancing, then
    /// graduation, enforced by direct sequential calls. Per-token failures
    /// are logged and the pass continues with the next token.
    pub async fn run_sync_tick(&self) -> EngineResult<usize> {
        let tokens = self.store.list_token_ids().await?;
        let mut processed = 0;

        for token_id in tokens {
            let lock = self.token_lock(&token_id).await;
            let _guard = lock.lock().await;

            let result = async {
                self.price.sync_price(&token_id).await?;

                match self.rebalancer.check_and_rebalance(&token_id).await? {
                    RebalanceOutcome::Rebalanced {
                        source_chain,
                        target_chain,
                        amount,
                        ..
                    } => {
                        info!(
                            "Tick rebalanced {} on {}: {} -> {}",
                            amount, token_id, source_chain, target_chain
                        );
                    }
                    RebalanceOutcome::NoAction { reason } => {
                        debug!("No rebalance for {}: {}", token_id, reason);
                    }
                }

                self.graduation.check_and_graduate(&token_id).await?;
                EngineResult::Ok(())
            }
            .await;

            match result {
                Ok(()) => processed += 1,
                Err(e) => {
                    error!("Sync tick failed for token {}: {}", token_id, e);
                    // Continue with other tokens
                }
            }
        }

        Ok(processed)
    }

    /// One price-deviation pass over every token; returns how many were
    /// flagged out of sync
    pub async fn run_deviation_tick(&self) -> EngineResult<usize> {
        let tokens = self.store.list_token_ids().await?;
        let mut flagged = 0;

        for token_id in tokens {
            match self.price.check_price_deviation(&token_id).await {
                Ok(deviation) if deviation.out_of_sync => {
                    flagged += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Deviation check failed for token {}: {}", token_id, e);
                }
            }
        }

        Ok(flagged)
    }

    /// Health check for the engine service
    pub async fn health_check(&self) -> EngineResult<()> {
        for settings in self.config.enabled_chains() {
            let Some(signer) = &settings.signer_address else {
                continue;
            };
            if !self.registry.contains(&settings.chain_id) {
                continue;
            }

            let client = self.registry.get(&settings.chain_id)?;
            let balance = client.get_balance(signer).await?;
            if balance < settings.min_balance {
                return Err(EngineError::InsufficientBalance {
                    chain: settings.chain_id.clone(),
                    balance: balance.to_string(),
                    required: settings.min_balance.to_string(),
                });
            }

            if let Some(factory) = &settings.dex_factory_address {
                let code = client.get_code(factory).await?;
                if code.is_empty() || code == "0x" {
                    warn!(
                        "DEX factory {} on {} has no deployed code",
                        factory, settings.chain_id
                    );
                }
            }

            debug!(
                "Health check passed for {} - balance: {}",
                settings.chain_id, balance
            );
        }

        Ok(())
    }
}
