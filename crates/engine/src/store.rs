//! Deployment store collaborator seam
//!
//! The durable store is external to the engine; this module defines the
//! operations the engine consumes and an in-memory implementation used in
//! development and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use omnilaunch_types::{
    CurveParams, Deployment, EngineError, EngineResult, LiquidityRequest,
};

/// Read/write operations the engine performs against the deployment store
///
/// Deployment rows are keyed by (token id, chain id) with a uniqueness
/// constraint on the pair; liquidity requests are keyed by their externally
/// issued request id so replays stay idempotent.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Fetch one deployment row
    async fn get_deployment(
        &self,
        token_id: &str,
        chain_id: &str,
    ) -> EngineResult<Option<Deployment>>;

    /// List every deployment of a token, ordered by chain id
    async fn list_deployments(&self, token_id: &str) -> EngineResult<Vec<Deployment>>;

    /// Insert or overwrite a deployment row
    async fn upsert_deployment(&self, deployment: Deployment) -> EngineResult<()>;

    /// All token ids with at least one deployment row
    async fn list_token_ids(&self) -> EngineResult<Vec<String>>;

    /// Fetch a token's curve parameters
    async fn get_curve_params(&self, token_id: &str) -> EngineResult<Option<CurveParams>>;

    /// Register or replace a token's curve parameters
    async fn put_curve_params(&self, params: CurveParams) -> EngineResult<()>;

    /// Fetch a liquidity request by its external request id
    async fn get_liquidity_request(
        &self,
        request_id: &str,
    ) -> EngineResult<Option<LiquidityRequest>>;

    /// Insert or overwrite a liquidity request
    async fn put_liquidity_request(&self, request: LiquidityRequest) -> EngineResult<()>;

    /// List a token's liquidity requests, newest first
    async fn list_liquidity_requests(&self, token_id: &str) -> EngineResult<Vec<LiquidityRequest>>;
}

/// In-memory deployment store
///
/// Interior mutability behind tokio RwLocks so the store handle can be
/// cloned across tasks.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    deployments: Arc<RwLock<HashMap<(String, String), Deployment>>>,
    curve_params: Arc<RwLock<HashMap<String, CurveParams>>>,
    requests: Arc<RwLock<HashMap<String, LiquidityRequest>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for InMemoryStore {
    async fn get_deployment(
        &self,
        token_id: &str,
        chain_id: &str,
    ) -> EngineResult<Option<Deployment>> {
        let key = (token_id.to_string(), chain_id.to_string());
        Ok(self.deployments.read().await.get(&key).cloned())
    }

    async fn list_deployments(&self, token_id: &str) -> EngineResult<Vec<Deployment>> {
        let mut rows: Vec<Deployment> = self
            .deployments
            .read()
            .await
            .values()
            .filter(|d| d.token_id == token_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.chain_id.cmp(&b.chain_id));
        Ok(rows)
    }

    async fn upsert_deployment(&self, deployment: Deployment) -> EngineResult<()> {
        if deployment.local_supply < rust_decimal::Decimal::ZERO {
            return Err(EngineError::invalid_parameter(
                "local_supply",
                &deployment.local_supply.to_string(),
                "non-negative",
            ));
        }
        let key = (deployment.token_id.clone(), deployment.chain_id.clone());
        self.deployments.write().await.insert(key, deployment);
        Ok(())
    }

    async fn list_token_ids(&self) -> EngineResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .deployments
            .read()
            .await
            .keys()
            .map(|(token_id, _)| token_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn get_curve_params(&self, token_id: &str) -> EngineResult<Option<CurveParams>> {
        Ok(self.curve_params.read().await.get(token_id).cloned())
    }

    async fn put_curve_params(&self, params: CurveParams) -> EngineResult<()> {
        params.validate()?;
        self.curve_params
            .write()
            .await
            .insert(params.token_id.clone(), params);
        Ok(())
    }

    async fn get_liquidity_request(
        &self,
        request_id: &str,
    ) -> EngineResult<Option<LiquidityRequest>> {
        Ok(self.requests.read().await.get(request_id).cloned())
    }

    async fn put_liquidity_request(&self, request: LiquidityRequest) -> EngineResult<()> {
        self.requests
            .write()
            .await
            .insert(request.request_id.clone(), request);
        Ok(())
    }

    async fn list_liquidity_requests(&self, token_id: &str) -> EngineResult<Vec<LiquidityRequest>> {
        let mut rows: Vec<LiquidityRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.token_id == token_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}
