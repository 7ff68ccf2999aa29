//! lectern-pipeline: the document-to-video execution engine.
//!
//! This crate contains the pipeline orchestrator (the job state machine),
//! the weighted progress reporter, the bounded runner pool, the stage
//! failure taxonomy, and the collaborator interfaces with their production
//! adapters (document parsing, LLM script generation, slide rendering,
//! narration synthesis, avatar clips, and ffmpeg composition).

pub mod collab;
pub mod command;
pub mod descriptor;
pub mod orchestrator;
pub mod progress;
pub mod runner;
pub mod stage;
pub mod tools;

pub use collab::Collaborators;
pub use orchestrator::Orchestrator;
pub use runner::RunnerPool;
pub use stage::{StageError, StageResult};
