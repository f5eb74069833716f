use std::fmt;

/// Why a process started rolling back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackReason {
    /// Name of the step that cancelled or failed
    pub step: String,
    pub message: String,
}

impl RollbackReason {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        RollbackReason { step: step.into(), message: message.into() }
    }
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

/// A compensating action that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackFailure {
    pub step: String,
    pub message: String,
}

impl RollbackFailure {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        RollbackFailure { step: step.into(), message: message.into() }
    }
}

impl fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rollback of {} failed: {}", self.step, self.message)
    }
}
