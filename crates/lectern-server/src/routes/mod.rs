//! API route handlers.

pub mod jobs;
pub mod tools;
