//! Graduation state machine
//!
//! Per (token, chain): not-eligible (threshold 0) -> below-threshold ->
//! graduated, and graduated is terminal. The transition fires when the
//! chain's market cap reaches the token's threshold, calls the DEX
//! pool-creation collaborator, and commits the flag together with its
//! evidence (pool address, transaction hash) in a single store update.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{error, info, warn};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use omnilaunch_types::{
    curve, CurveParams, Deployment, EngineError, EngineResult, GraduationOutcome,
    GraduationStatus,
};

use crate::chain::{ChainRegistry, EventFilter, TransactionRequest};
use crate::config::{ChainSettings, EngineConfig, RetryConfig};
use crate::store::DeploymentStore;

// ============================================================================
// Pool Creation Collaborator
// ============================================================================

/// Result of a successful DEX pool creation
#[derive(Debug, Clone, PartialEq)]
pub struct PoolCreation {
    pub pool_address: String,
    pub tx_hash: String,
}

/// Creates the destination DEX pool for a graduating deployment; one trait
/// method covers every chain's DEX
#[async_trait]
pub trait DexPoolCreator: Send + Sync {
    async fn create_pool(
        &self,
        chain_id: &str,
        token_address: &str,
        reserve_amount: Decimal,
        token_amount: Decimal,
    ) -> EngineResult<PoolCreation>;
}

/// Pool creator that submits against each chain's configured DEX factory
pub struct RpcDexPoolCreator {
    registry: Arc<ChainRegistry>,
    chain_settings: HashMap<String, ChainSettings>,
}

impl RpcDexPoolCreator {
    pub fn new(registry: Arc<ChainRegistry>, config: &EngineConfig) -> Self {
        let chain_settings = config
            .chains
            .iter()
            .map(|c| (c.chain_id.clone(), c.clone()))
            .collect();
        Self {
            registry,
            chain_settings,
        }
    }
}

#[async_trait]
impl DexPoolCreator for RpcDexPoolCreator {
    async fn create_pool(
        &self,
        chain_id: &str,
        token_address: &str,
        reserve_amount: Decimal,
        token_amount: Decimal,
    ) -> EngineResult<PoolCreation> {
        let settings = self.chain_settings.get(chain_id).ok_or_else(|| {
            EngineError::UnknownChain {
                chain: chain_id.to_string(),
            }
        })?;
        let factory = settings.dex_factory_address.clone().ok_or_else(|| {
            EngineError::invalid_config(&format!("no DEX factory configured for chain '{}'", chain_id))
        })?;
        let signer = settings.signer_address.clone().ok_or_else(|| {
            EngineError::invalid_config(&format!("no signer configured for chain '{}'", chain_id))
        })?;

        let client = self.registry.get(chain_id)?;
        let tx = TransactionRequest {
            from: signer,
            to: factory.clone(),
            value: reserve_amount,
            data: Some(pool_payload(token_address, token_amount)),
        };

        let tx_hash = client.send_transaction(tx).await?;
        let receipt = client.wait_for_receipt(&tx_hash).await?;
        if !receipt.success {
            return Err(EngineError::transaction_failed(
                chain_id,
                Some(receipt.tx_hash),
                "pool creation reverted",
            ));
        }

        let filter = EventFilter {
            address: factory,
            topic: settings.pool_created_topic.clone(),
            from_block: Some(receipt.block_number),
        };
        let pool_address = client
            .query_events(filter)
            .await?
            .into_iter()
            .find(|e| e.tx_hash == receipt.tx_hash)
            .and_then(|e| e.topics.get(1).cloned().or_else(|| {
                if !e.data.is_empty() && e.data != "0x" {
                    Some(e.data)
                } else {
                    None
                }
            }))
            .ok_or_else(|| {
                EngineError::rpc_error(chain_id, "pool address not found in factory events")
            })?;

        Ok(PoolCreation {
            pool_address,
            tx_hash: receipt.tx_hash,
        })
    }
}

/// Opaque pool-creation payload; the factory's wire format lives on-chain
fn pool_payload(token_address: &str, token_amount: Decimal) -> String {
    let raw = format!("pool:{}:{}", token_address, token_amount);
    let mut out = String::with_capacity(2 + raw.len() * 2);
    out.push_str("0x");
    for b in raw.as_bytes() {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

// ============================================================================
// State Machine
// ============================================================================

/// Whether the transition should fire for this deployment right now
pub fn needs_graduation(params: &CurveParams, deployment: &Deployment) -> bool {
    params.graduation_enabled()
        && !deployment.graduated
        && deployment.market_cap >= params.graduation_threshold
}

/// Failed-attempt bookkeeping per (token, chain)
#[derive(Debug, Clone, Copy, Default)]
struct AttemptState {
    attempts: u32,
    next_attempt_at: i64,
    exhausted: bool,
}

/// Watches market cap against the threshold and drives the one-way
/// transition into a DEX pool
pub struct GraduationManager {
    store: Arc<dyn DeploymentStore>,
    pool_creator: Arc<dyn DexPoolCreator>,
    retry: RetryConfig,
    attempts: Mutex<HashMap<(String, String), AttemptState>>,
    dry_run: bool,
}

impl GraduationManager {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        pool_creator: Arc<dyn DexPoolCreator>,
        retry: RetryConfig,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            pool_creator,
            retry,
            attempts: Mutex::new(HashMap::new()),
            dry_run,
        }
    }

    /// Evaluate every deployment of a token and graduate the ones past the
    /// threshold
    ///
    /// Already-graduated chains are untouched: no duplicate pool creation,
    /// no changed pool address. A failed pool creation leaves the chain
    /// below the threshold and backs off before the next attempt; exhausted
    /// attempts park the chain for operator attention.
    pub async fn check_and_graduate(&self, token_id: &str) -> EngineResult<Vec<GraduationOutcome>> {
        let params = self
            .store
            .get_curve_params(token_id)
            .await?
            .ok_or_else(|| EngineError::CurveParamsNotFound {
                token: token_id.to_string(),
            })?;

        let deployments = self.store.list_deployments(token_id).await?;
        let mut outcomes = Vec::with_capacity(deployments.len());

        for deployment in deployments {
            let chain_id = deployment.chain_id.clone();

            if !params.graduation_enabled() {
                outcomes.push(GraduationOutcome::NotEligible { chain_id });
                continue;
            }

            if deployment.graduated {
                outcomes.push(GraduationOutcome::AlreadyGraduated { chain_id });
                continue;
            }

            if !needs_graduation(&params, &deployment) {
                outcomes.push(GraduationOutcome::BelowThreshold {
                    chain_id,
                    progress_percent: curve::graduation_progress(
                        deployment.market_cap,
                        params.graduation_threshold,
                    ),
                });
                continue;
            }

            // Threshold crossed; check the attempt gate before submitting
            let key = (token_id.to_string(), chain_id.clone());
            let now = Utc::now().timestamp();
            {
                let attempts = self.attempts.lock().await;
                if let Some(state) = attempts.get(&key) {
                    if state.exhausted {
                        outcomes.push(GraduationOutcome::RetriesExhausted {
                            chain_id,
                            attempts: state.attempts,
                        });
                        continue;
                    }
                    if now < state.next_attempt_at {
                        outcomes.push(GraduationOutcome::Deferred {
                            chain_id,
                            retry_at: state.next_attempt_at,
                        });
                        continue;
                    }
                }
            }

            if self.dry_run {
                info!(
                    "DRY RUN: would graduate {} on {} (market cap {} >= {})",
                    token_id, chain_id, deployment.market_cap, params.graduation_threshold
                );
                outcomes.push(GraduationOutcome::Graduated {
                    chain_id,
                    pool_address: "dry-run".to_string(),
                    tx_hash: "dry-run".to_string(),
                });
                continue;
            }

            info!(
                "Graduating {} on {}: market cap {} reached threshold {}",
                token_id, chain_id, deployment.market_cap, params.graduation_threshold
            );

            match self
                .pool_creator
                .create_pool(
                    &chain_id,
                    &deployment.token_address,
                    deployment.local_reserve,
                    deployment.local_supply,
                )
                .await
            {
                Ok(pool) => {
                    // Commit the transition and its evidence together
                    let mut updated = deployment;
                    updated.graduated = true;
                    updated.graduated_at = Some(Utc::now());
                    updated.pool_address = Some(pool.pool_address.clone());
                    updated.graduation_tx = Some(pool.tx_hash.clone());
                    updated.updated_at = Utc::now();
                    self.store.upsert_deployment(updated).await?;

                    self.attempts.lock().await.remove(&key);

                    info!(
                        "Graduated {} on {}: pool {} (tx {})",
                        token_id, chain_id, pool.pool_address, pool.tx_hash
                    );
                    outcomes.push(GraduationOutcome::Graduated {
                        chain_id,
                        pool_address: pool.pool_address,
                        tx_hash: pool.tx_hash,
                    });
                }
                Err(e) => {
                    let mut attempts = self.attempts.lock().await;
                    let state = attempts.entry(key).or_default();
                    state.attempts += 1;
                    state.next_attempt_at =
                        now + (self.retry.delay_for_attempt(state.attempts) / 1000) as i64;

                    if state.attempts >= self.retry.max_retries {
                        state.exhausted = true;
                        error!(
                            "Graduation of {} on {} exhausted {} attempts; parking for operator attention (last error: {})",
                            token_id, chain_id, state.attempts, e
                        );
                        outcomes.push(GraduationOutcome::RetriesExhausted {
                            chain_id,
                            attempts: state.attempts,
                        });
                    } else {
                        error!(
                            "Pool creation for {} on {} failed (attempt {}): {}",
                            token_id, chain_id, state.attempts, e
                        );
                        outcomes.push(GraduationOutcome::Failed {
                            chain_id,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(outcomes)
    }

    /// Read-only progress view for UI consumption
    pub async fn graduation_status(
        &self,
        token_id: &str,
        chain_id: &str,
    ) -> EngineResult<GraduationStatus> {
        let params = self
            .store
            .get_curve_params(token_id)
            .await?
            .ok_or_else(|| EngineError::CurveParamsNotFound {
                token: token_id.to_string(),
            })?;

        let deployment = self
            .store
            .get_deployment(token_id, chain_id)
            .await?
            .ok_or_else(|| EngineError::DeploymentNotFound {
                token: token_id.to_string(),
                chain: chain_id.to_string(),
            })?;

        Ok(GraduationStatus {
            token_id: token_id.to_string(),
            chain_id: chain_id.to_string(),
            graduated: deployment.graduated,
            eligible: params.graduation_enabled(),
            market_cap: deployment.market_cap,
            threshold: params.graduation_threshold,
            progress_percent: curve::graduation_progress(
                deployment.market_cap,
                params.graduation_threshold,
            ),
            pool_address: deployment.pool_address,
        })
    }

    /// Clear a parked chain so graduation can be attempted again
    pub async fn reset_attempts(&self, token_id: &str, chain_id: &str) {
        let key = (token_id.to_string(), chain_id.to_string());
        if self.attempts.lock().await.remove(&key).is_some() {
            warn!(
                "Cleared graduation attempt state for {} on {}",
                token_id, chain_id
            );
        }
    }
}
