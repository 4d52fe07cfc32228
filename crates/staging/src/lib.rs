//! Input resolution and staging.
//!
//! Turns declared table and file inputs into concrete, branch-aware
//! transfers into a staging target, and keeps the per-source state that
//! makes incremental ("adaptive") loading possible.

pub mod api;
pub mod branch;
pub mod error;
pub mod load_type;
pub mod orchestrator;
pub mod query;
pub mod source;
pub mod state;
pub mod strategy;
pub mod workspace;

pub use error::StagingError;
pub use orchestrator::{Orchestrator, PollSettings, TransferOutcome, TransferResult};
pub use source::SourceSpec;
pub use state::StateSnapshot;
