//! lectern-server: the HTTP API surface.
//!
//! Exposes the upload/start/poll/retry/delete job lifecycle over REST,
//! backed by the job store, the artifact store, and the runner pool.

pub mod context;
pub mod error;
pub mod router;
pub mod routes;

pub use context::AppContext;
pub use router::build_router;
