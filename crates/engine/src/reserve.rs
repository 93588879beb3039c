//! Reserve monitoring
//!
//! Pure computation over current deployment rows: actual vs ideal vs
//! minimum collateral per chain. Performs no writes; it is the sole input
//! to rebalancing and to the pre-sell sufficiency check.

use std::sync::Arc;

use rust_decimal::Decimal;

use omnilaunch_types::{EngineError, EngineResult, ReserveCheck, ReserveSnapshot};

use crate::store::DeploymentStore;

/// Computes per-chain reserve snapshots and health classification
pub struct ReserveMonitor {
    store: Arc<dyn DeploymentStore>,
}

impl ReserveMonitor {
    pub fn new(store: Arc<dyn DeploymentStore>) -> Self {
        Self { store }
    }

    /// Snapshot every deployed chain's reserve health
    ///
    /// The ideal allocation weights the total reserve by each chain's share
    /// of total supply; when nothing has been sold anywhere the split is
    /// equal.
    pub async fn monitor_reserves(&self, token_id: &str) -> EngineResult<Vec<ReserveSnapshot>> {
        let deployments: Vec<_> = self
            .store
            .list_deployments(token_id)
            .await?
            .into_iter()
            .filter(|d| d.is_active())
            .collect();

        if deployments.is_empty() {
            return Ok(vec![]);
        }

        let total_reserve: Decimal = deployments.iter().map(|d| d.local_reserve).sum();
        let total_supply: Decimal = deployments.iter().map(|d| d.local_supply).sum();
        let chain_count = Decimal::from(deployments.len() as u64);

        let snapshots = deployments
            .iter()
            .map(|d| {
                let ideal = if total_supply.is_zero() {
                    total_reserve / chain_count
                } else {
                    total_reserve * d.local_supply / total_supply
                };
                ReserveSnapshot::compute(&d.chain_id, d.local_reserve, ideal)
            })
            .collect();

        Ok(snapshots)
    }

    /// Whether a chain can honor a sell of the required size
    ///
    /// Exposed for the trade-settlement collaborator to call before
    /// executing a sell.
    pub async fn check_reserves(
        &self,
        token_id: &str,
        chain_id: &str,
        required_amount: Decimal,
    ) -> EngineResult<ReserveCheck> {
        let deployment = self
            .store
            .get_deployment(token_id, chain_id)
            .await?
            .ok_or_else(|| EngineError::DeploymentNotFound {
                token: token_id.to_string(),
                chain: chain_id.to_string(),
            })?;

        Ok(ReserveCheck {
            sufficient: deployment.local_reserve >= required_amount,
            current_reserve: deployment.local_reserve,
            required_amount,
        })
    }
}
