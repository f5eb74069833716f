//! Transactional process execution
//!
//! A [`Process`] drives a tree of [`ProcessStep`]s. Each step is reversible;
//! when one fails, every step that finished before it is rolled back in
//! reverse completion order. Steps exchange data through the typed slots of a
//! [`ProcessContext`].

pub mod builder;
pub mod composite;
pub mod context;
pub mod data_steps;
pub mod env;
pub mod errors;
pub mod process;
pub mod reason;
pub mod share;
pub mod state;
pub mod step;

pub use builder::ProcessBuilder;
pub use composite::{CompositeMode, ProcessComposite};
pub use context::{ProcessContext, Slot};
pub use data_steps::{
    cancel, DigestExpectation, DigestStep, GetStep, ProtectionSource, PutContent, PutStep,
    RemoveStep,
};
pub use env::{AbortSignal, ExecutionEnv};
pub use errors::{ContextError, ProcessError, ProcessResult};
pub use process::{Process, ProcessReport, ABORT_ORIGIN};
pub use reason::{RollbackFailure, RollbackReason};
pub use share::ShareFolder;
pub use state::{ProcessStatus, StepState};
pub use step::{ProcessStep, StepFailure, StepKind};
