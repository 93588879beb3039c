//! Error types for the synchronization service binary

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Engine error: {0}")]
    Engine(#[from] omnilaunch_types::EngineError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ServiceError {
    fn from(err: toml::de::Error) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for ServiceError {
    fn from(err: toml::ser::Error) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}
