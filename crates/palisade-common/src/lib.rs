//! # Palisade Common
//!
//! Shared types, error taxonomy, and constants used across Palisade
//! components.
//!
//! ## Modules
//! - `types` - Core data structures (ErrorCode, VerificationResult, Submission)
//! - `error` - Common error types
//! - `constants` - Shared field names, key prefixes, and defaults

pub mod constants;
pub mod error;
pub mod types;

pub use error::GateError;
pub use types::*;
