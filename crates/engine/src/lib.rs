pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod graduation;
pub mod price;
pub mod rebalancer;
pub mod reserve;
pub mod store;
pub mod supply;
pub mod testing;

pub use chain::{ChainClient, ChainRegistry, JsonRpcChainClient};
pub use config::{ChainSettings, EngineConfig, RetryConfig};
pub use engine::SyncEngine;
pub use error::ServiceError;
pub use graduation::{DexPoolCreator, GraduationManager, PoolCreation, RpcDexPoolCreator};
pub use price::PriceSynchronizer;
pub use rebalancer::LiquidityRebalancer;
pub use reserve::ReserveMonitor;
pub use store::{DeploymentStore, InMemoryStore};
pub use supply::SupplyAggregator;
