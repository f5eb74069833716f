//! Error types for the process engine

use thiserror::Error;
use uuid::Uuid;

use super::reason::RollbackReason;
use super::state::StepState;
use crate::core_data::DataError;

/// Misuse of a process context slot
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Slot '{0}' is empty")]
    Empty(&'static str),

    /// The single consumer already took the value
    #[error("Slot '{0}' was already consumed")]
    AlreadyConsumed(&'static str),

    #[error("Slot '{0}' holds a value of another type")]
    TypeMismatch(&'static str),

    #[error("Slot '{slot}' is owned by step '{owner}'")]
    NotOwner { slot: &'static str, owner: String },
}

/// Errors raised while running a process
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessError {
    /// A step was executed or rolled back outside its allowed state
    #[error("Invalid state for step '{step}': expected {expected}, found {actual}")]
    InvalidState { step: String, expected: &'static str, actual: StepState },

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// A step cancelled itself
    #[error("Cancelled by {0}")]
    Cancelled(RollbackReason),

    /// A step cancelled itself but could not undo its own partial effect
    #[error("Cancelled by {reason}; left behind: {residue}")]
    CancelledDirty { reason: RollbackReason, residue: String },

    #[error("Process {0} already started")]
    AlreadyStarted(Uuid),

    #[error("Process {0} was not started")]
    NotStarted(Uuid),

    #[error("Process task failed: {0}")]
    Join(String),
}

impl ProcessError {
    /// Recoverable conditions roll back; everything else is a contract violation
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProcessError::Cancelled(_) | ProcessError::CancelledDirty { .. })
    }
}

/// Result type for process operations
pub type ProcessResult<T> = Result<T, ProcessError>;
