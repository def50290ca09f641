pub mod error;
pub mod filler;
pub mod model;
pub mod orchestrator;
pub mod plan;

pub use error::BatchError;
pub use filler::{FillOutcome, FillerOptions, FormFiller, ResumePoint};
pub use model::{BatchResult, ItemOutcome};
pub use orchestrator::{BatchOptions, BatchOrchestrator};
pub use plan::{FieldPlan, FormPlan, SubStep};
