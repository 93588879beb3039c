//! Global supply aggregation
//!
//! The global supply figure is derived on demand by summing per-chain
//! supplies; it is never persisted, so every reader sees the current sum.

use std::sync::Arc;

use chrono::Utc;
use log::debug;
use rust_decimal::Decimal;

use omnilaunch_types::{EngineError, EngineResult};

use crate::store::DeploymentStore;

/// Sums per-chain sold supply into one global figure per token
pub struct SupplyAggregator {
    store: Arc<dyn DeploymentStore>,
}

impl SupplyAggregator {
    pub fn new(store: Arc<dyn DeploymentStore>) -> Self {
        Self { store }
    }

    /// Current global supply: sum of every chain's local supply
    pub async fn global_supply(&self, token_id: &str) -> EngineResult<Decimal> {
        let deployments = self.store.list_deployments(token_id).await?;
        Ok(deployments.iter().map(|d| d.local_supply).sum())
    }

    /// Overwrite one chain's local supply and return the fresh global sum
    ///
    /// The caller is responsible for computing the correct new value from
    /// its buy/sell deltas; the only validation here is non-negativity.
    pub async fn update_local_supply(
        &self,
        token_id: &str,
        chain_id: &str,
        new_supply: Decimal,
    ) -> EngineResult<Decimal> {
        if new_supply < Decimal::ZERO {
            return Err(EngineError::invalid_parameter(
                "new_supply",
                &new_supply.to_string(),
                "non-negative",
            ));
        }

        let mut deployment = self
            .store
            .get_deployment(token_id, chain_id)
            .await?
            .ok_or_else(|| EngineError::DeploymentNotFound {
                token: token_id.to_string(),
                chain: chain_id.to_string(),
            })?;

        deployment.local_supply = new_supply;
        deployment.updated_at = Utc::now();
        self.store.upsert_deployment(deployment).await?;

        let global = self.global_supply(token_id).await?;
        debug!(
            "Updated local supply for {} on {}: {} (global now {})",
            token_id, chain_id, new_supply, global
        );

        Ok(global)
    }
}
