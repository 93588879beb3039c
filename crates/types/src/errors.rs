use thiserror::Error;

// ============================================================================
// Main Error Enum
// ============================================================================

/// Comprehensive error enum for the Omnilaunch synchronization engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // ========================================================================
    // Store Errors
    // ========================================================================

    /// Deployment store read or write failed
    #[error("Store error in '{operation}': {reason}")]
    StoreError { operation: String, reason: String },

    /// No deployment row exists for the (token, chain) pair
    #[error("Deployment not found for token '{token}' on chain '{chain}'")]
    DeploymentNotFound { token: String, chain: String },

    /// No curve parameters are registered for the token
    #[error("Curve parameters not found for token '{token}'")]
    CurveParamsNotFound { token: String },

    /// No liquidity request exists for the request id
    #[error("Liquidity request '{request_id}' not found")]
    RequestNotFound { request_id: String },

    // ========================================================================
    // Chain Client Errors
    // ========================================================================

    /// RPC call to a chain node failed
    #[error("RPC error on chain '{chain}': {reason}")]
    RpcError { chain: String, reason: String },

    /// Submitted transaction reverted or was dropped
    #[error("Transaction failed on chain '{chain}' (tx {tx_hash:?}): {reason}")]
    TransactionFailed {
        chain: String,
        tx_hash: Option<String>,
        reason: String,
    },

    /// Signer balance is below the configured operating minimum
    #[error("Insufficient balance on chain '{chain}': have {balance}, need {required}")]
    InsufficientBalance {
        chain: String,
        balance: String,
        required: String,
    },

    /// Chain id is not present in the registry
    #[error("Unknown chain '{chain}'")]
    UnknownChain { chain: String },

    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Invalid parameter
    #[error("Invalid parameter '{parameter}': got '{value}', expected '{expected}'")]
    InvalidParameter {
        parameter: String,
        value: String,
        expected: String,
    },

    /// A supply or reserve figure failed to parse as a decimal
    #[error("Invalid decimal for '{field}': '{value}'")]
    InvalidDecimal { field: String, value: String },

    /// Invalid engine configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================

    /// Graduation was requested for an already-graduated deployment
    #[error("Token '{token}' already graduated on chain '{chain}'")]
    AlreadyGraduated { token: String, chain: String },

    /// Generic engine error
    #[error("{0}")]
    Generic(String),
}

// ============================================================================
// Helper Constructors
// ============================================================================

impl EngineError {
    /// Create a store error
    pub fn store_error(operation: &str, reason: &str) -> Self {
        EngineError::StoreError {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an RPC error
    pub fn rpc_error(chain: &str, reason: &str) -> Self {
        EngineError::RpcError {
            chain: chain.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a transaction failure error
    pub fn transaction_failed(chain: &str, tx_hash: Option<String>, reason: &str) -> Self {
        EngineError::TransactionFailed {
            chain: chain.to_string(),
            tx_hash,
            reason: reason.to_string(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: &str, value: &str, expected: &str) -> Self {
        EngineError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Create an invalid decimal error
    pub fn invalid_decimal(field: &str, value: &str) -> Self {
        EngineError::InvalidDecimal {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Create a configuration error
    pub fn invalid_config(reason: &str) -> Self {
        EngineError::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create a generic error
    pub fn generic(reason: &str) -> Self {
        EngineError::Generic(reason.to_string())
    }
}
