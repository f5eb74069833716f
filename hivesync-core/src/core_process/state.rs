//! Step and process lifecycle states

use std::fmt;

/// Lifecycle of one step
///
/// `Ready -> Executing -> {ExecutionSucceeded | ExecutionFailed}`, then on
/// rollback `-> RollingBack -> {RollbackSucceeded | RollbackFailed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepState {
    Ready,
    Executing,
    ExecutionSucceeded,
    ExecutionFailed,
    RollingBack,
    RollbackSucceeded,
    RollbackFailed,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Ready => "ready",
            StepState::Executing => "executing",
            StepState::ExecutionSucceeded => "execution_succeeded",
            StepState::ExecutionFailed => "execution_failed",
            StepState::RollingBack => "rolling_back",
            StepState::RollbackSucceeded => "rollback_succeeded",
            StepState::RollbackFailed => "rollback_failed",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a whole process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    Ready,
    Running,
    RollingBack,
    Succeeded,
    /// Rolled back cleanly
    Failed,
    /// At least one compensating action failed; needs external reconciliation
    FailedDirty,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Ready => "ready",
            ProcessStatus::Running => "running",
            ProcessStatus::RollingBack => "rolling_back",
            ProcessStatus::Succeeded => "succeeded",
            ProcessStatus::Failed => "failed",
            ProcessStatus::FailedDirty => "failed_dirty",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessStatus::Succeeded | ProcessStatus::Failed | ProcessStatus::FailedDirty)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
