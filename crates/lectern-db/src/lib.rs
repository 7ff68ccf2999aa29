//! lectern-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage for the job table with
//! connection pooling, embedded migrations, the typed [`models::Job`]
//! record, and the query module implementing every atomic mutation the
//! orchestrator performs.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
