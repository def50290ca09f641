//! Checkpoint store
//!
//! Holds the single durable record describing where a workflow run last
//! made progress. Writes are last-writer-wins; one writer is expected.

pub mod api;
pub mod errors;
pub mod file;
pub mod fs;
pub mod memory;
pub mod model;

pub use api::CheckpointStore;
pub use errors::StoreError;
pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use model::{
    Checkpoint, HandoffState, Progress, ResultStatus, Stage, WorkflowResult,
    HANDOFF_STATE_VERSION,
};
