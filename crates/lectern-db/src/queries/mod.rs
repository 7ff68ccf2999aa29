//! Database query modules.

pub mod jobs;
