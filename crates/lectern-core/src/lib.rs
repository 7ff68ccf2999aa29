//! lectern-core: shared types, IDs, errors, configuration, and artifact storage.
//!
//! This crate is the foundational dependency for all other lectern crates,
//! providing the type-safe job identifier, a unified error type, the
//! presentation-domain enums and records, application configuration, and the
//! job-scoped artifact store.

pub mod config;
pub mod error;
pub mod ids;
pub mod storage;
pub mod types;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, FailureKind, Result};
pub use ids::*;
pub use types::*;
