//! Service-oriented application context.
//!
//! [`AppContext`] is the central struct shared across all route handlers via
//! Axum state. It is constructed once at service start and injected into
//! both the API layer and the runner pool, so the job table has a single
//! owner with a defined lifecycle.

use std::sync::Arc;

use lectern_core::config::Config;
use lectern_core::storage::ArtifactStore;
use lectern_db::pool::DbPool;
use lectern_pipeline::tools::ToolRegistry;
use lectern_pipeline::RunnerPool;

/// Application context shared by all request handlers (via Axum state).
///
/// This is cheaply cloneable; every member is an `Arc` or a pooled handle.
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool.
    pub db: DbPool,
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// Job-scoped artifact storage.
    pub store: ArtifactStore,
    /// External tool registry.
    pub tools: Arc<ToolRegistry>,
    /// Bounded pool executing pipeline runs.
    pub runner: RunnerPool,
}
