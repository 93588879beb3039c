//! Price synchronization
//!
//! Price is a pure function of the global supply, so every chain converges
//! on the same quote as soon as this pass runs after any chain's trade. No
//! collateral moves here; only the per-chain market-cap bookkeeping differs,
//! proportionally to each chain's own volume share.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use rust_decimal::{Decimal, MathematicalOps};

use omnilaunch_types::{
    curve, EngineError, EngineResult, PriceDeviation, PriceSync,
};

use crate::store::DeploymentStore;

/// Applies the bonding-curve formula to the global supply and republishes
/// each chain's market-cap projection
pub struct PriceSynchronizer {
    store: Arc<dyn DeploymentStore>,

    /// Coefficient-of-variation ceiling (percent) for the deviation check
    max_deviation_percent: Decimal,
}

impl PriceSynchronizer {
    pub fn new(store: Arc<dyn DeploymentStore>, max_deviation_percent: Decimal) -> Self {
        Self {
            store,
            max_deviation_percent,
        }
    }

    /// Recompute the shared price and persist per-chain market caps
    pub async fn sync_price(&self, token_id: &str) -> EngineResult<PriceSync> {
        let params = self
            .store
            .get_curve_params(token_id)
            .await?
            .ok_or_else(|| EngineError::CurveParamsNotFound {
                token: token_id.to_string(),
            })?;

        let deployments = self.store.list_deployments(token_id).await?;
        let global_supply: Decimal = deployments.iter().map(|d| d.local_supply).sum();
        let price = curve::spot_price(&params, global_supply);

        let mut chains_updated = 0;
        for mut deployment in deployments {
            deployment.market_cap = curve::market_cap(price, deployment.local_supply);
            deployment.updated_at = Utc::now();
            self.store.upsert_deployment(deployment).await?;
            chains_updated += 1;
        }

        debug!(
            "Synced price for {}: global_supply={}, price={}, chains={}",
            token_id, global_supply, price, chains_updated
        );

        Ok(PriceSync {
            token_id: token_id.to_string(),
            global_supply,
            price,
            chains_updated,
        })
    }

    /// Read-only dispersion check across independently recomputed prices
    ///
    /// Each chain's price is derived from its own fresh read of the store,
    /// so drift between reads shows up as a nonzero coefficient of
    /// variation. Diagnostic only; nothing is corrected here.
    pub async fn check_price_deviation(&self, token_id: &str) -> EngineResult<PriceDeviation> {
        let params = self
            .store
            .get_curve_params(token_id)
            .await?
            .ok_or_else(|| EngineError::CurveParamsNotFound {
                token: token_id.to_string(),
            })?;

        let chains: Vec<String> = self
            .store
            .list_deployments(token_id)
            .await?
            .into_iter()
            .map(|d| d.chain_id)
            .collect();

        let mut prices = Vec::with_capacity(chains.len());
        for _chain in &chains {
            // one independent read per sampled chain
            let deployments = self.store.list_deployments(token_id).await?;
            let global: Decimal = deployments.iter().map(|d| d.local_supply).sum();
            prices.push(curve::spot_price(&params, global));
        }

        let sampled_chains = prices.len();
        if sampled_chains == 0 {
            return Ok(PriceDeviation {
                token_id: token_id.to_string(),
                mean_price: Decimal::ZERO,
                coefficient_of_variation: Decimal::ZERO,
                out_of_sync: false,
                sampled_chains,
            });
        }

        let count = Decimal::from(sampled_chains as u64);
        let mean: Decimal = prices.iter().copied().sum::<Decimal>() / count;

        let coefficient_of_variation = if mean.is_zero() {
            Decimal::ZERO
        } else {
            let variance: Decimal = prices
                .iter()
                .map(|p| {
                    let diff = *p - mean;
                    diff * diff
                })
                .sum::<Decimal>()
                / count;
            let std_dev = variance.sqrt().unwrap_or(Decimal::ZERO);
            std_dev / mean * Decimal::ONE_HUNDRED
        };

        let out_of_sync = coefficient_of_variation > self.max_deviation_percent;
        if out_of_sync {
            warn!(
                "Price deviation for {}: CV {}% exceeds {}% across {} chains",
                token_id, coefficient_of_variation, self.max_deviation_percent, sampled_chains
            );
        }

        Ok(PriceDeviation {
            token_id: token_id.to_string(),
            mean_price: mean,
            coefficient_of_variation,
            out_of_sync,
            sampled_chains,
        })
    }
}
