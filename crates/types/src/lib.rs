/// Shared types for the Omnilaunch launchpad
///
/// This crate provides common type definitions, constants, and curve math
/// that are used across the synchronization engine and other platform
/// components.

pub mod constants;
pub mod curve;
pub mod deployment;
pub mod errors;
pub mod liquidity;

// Re-export all public types
pub use constants::*;
pub use curve::*;
pub use deployment::*;
pub use errors::*;
pub use liquidity::*;

/// Result type alias using the shared error type
pub type EngineResult<T> = std::result::Result<T, EngineError>;
