//! Declarative browser workflows
//!
//! A [`Workflow`] is a list of named steps. Each step validates the page,
//! runs its actions and hands control to a [`Transition`]. When the page is
//! not where a step expects, the [`RecoveryTable`] decides where to go from
//! what the browser actually shows.

pub mod context;
pub mod errors;
pub mod executor;
pub mod recovery;
pub mod strategies;
pub mod types;
pub mod variables;

pub use context::{SessionContext, PROGRESS_REASON};
pub use errors::FlowError;
pub use executor::{FlowOutcome, FlowStatus, SequencerOptions, StepPhase, StepSequencer};
pub use recovery::{Condition, Observation, RecoveryCheck, RecoveryTable};
pub use strategies::RetryPolicy;
pub use types::{
    ConditionalCheck, Predicate, StepDefinition, Transition, TransitionRules, Workflow,
};
pub use variables::{item_variables, render, substitute};
