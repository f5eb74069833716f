/*
    ProcessStep - the atomic, reversible unit of a process

    Responsibilities:
    `step.rs` owns the per-step state machine and dispatches execute/rollback
    over the closed set of step variants:

    Ready -> Executing -> {ExecutionSucceeded | ExecutionFailed}
    ExecutionSucceeded -> RollingBack -> {RollbackSucceeded | RollbackFailed}

    A composite may also roll back from ExecutionFailed, since children that
    finished before the failing one still need compensation. Calls outside the
    allowed state are rejected with `InvalidState` and change nothing.
*/

use futures::future::{BoxFuture, FutureExt};
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

use super::composite::ProcessComposite;
use super::context::Slot;
use super::data_steps::{
    DigestExpectation, DigestStep, GetStep, ProtectionSource, PutContent, PutStep, RemoveStep,
};
use super::env::ExecutionEnv;
use super::errors::{ProcessError, ProcessResult};
use super::reason::{RollbackFailure, RollbackReason};
use super::state::StepState;
use crate::core_data::StoredEntry;
use crate::core_dht::{ContentAddress, FourPartKey, Target};

/// Why a step did not succeed
#[derive(Debug, Clone)]
pub struct StepFailure {
    /// Reason handed to every rollback handler
    pub reason: RollbackReason,
    pub error: ProcessError,
    /// Partial effects the failing steps could not take back themselves
    pub residue: Vec<RollbackFailure>,
}

impl StepFailure {
    pub fn cancelled(reason: RollbackReason) -> Self {
        StepFailure { error: ProcessError::Cancelled(reason.clone()), reason, residue: Vec::new() }
    }

    pub fn from_error(step: &str, error: ProcessError) -> Self {
        let (reason, residue) = match &error {
            ProcessError::Cancelled(reason) => (reason.clone(), Vec::new()),
            ProcessError::CancelledDirty { reason, residue } => {
                (reason.clone(), vec![RollbackFailure::new(step, residue.clone())])
            }
            other => (RollbackReason::new(step, other.to_string()), Vec::new()),
        };
        StepFailure { reason, error, residue }
    }

    pub fn is_fatal(&self) -> bool {
        self.error.is_fatal()
    }
}

/// The step variants
#[derive(Debug)]
pub enum StepKind {
    Put(PutStep),
    Remove(RemoveStep),
    Get(GetStep),
    Digest(DigestStep),
    Composite(ProcessComposite),
}

/// One node of a process tree
#[derive(Debug)]
pub struct ProcessStep {
    name: String,
    state: StepState,
    kind: StepKind,
}

impl ProcessStep {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        ProcessStep { name: name.into(), state: StepState::Ready, kind }
    }

    /// Write `content` into `address`
    pub fn put(
        name: impl Into<String>,
        address: ContentAddress,
        content: impl Into<PutContent>,
        protection: impl Into<ProtectionSource>,
    ) -> Self {
        Self::new(name, StepKind::Put(PutStep::new(address, content.into(), protection.into())))
    }

    pub fn remove(name: impl Into<String>, target: Target, protection: impl Into<ProtectionSource>) -> Self {
        Self::new(name, StepKind::Remove(RemoveStep::new(target, protection.into())))
    }

    /// Fetch into `into`; absence is not a failure
    pub fn get(name: impl Into<String>, target: Target, into: Slot<StoredEntry>) -> Self {
        Self::new(name, StepKind::Get(GetStep::new(target, into)))
    }

    /// Fetch into `into`; absence cancels with `missing`
    pub fn get_required(
        name: impl Into<String>,
        target: Target,
        into: Slot<StoredEntry>,
        missing: impl Into<String>,
    ) -> Self {
        Self::new(name, StepKind::Get(GetStep::new(target, into).required(missing)))
    }

    pub fn digest(name: impl Into<String>, target: Target, expect: DigestExpectation) -> Self {
        Self::new(name, StepKind::Digest(DigestStep::new(target, expect)))
    }

    /// Digest whose keys are stored in `into`
    pub fn digest_into(
        name: impl Into<String>,
        target: Target,
        expect: DigestExpectation,
        into: Slot<BTreeSet<FourPartKey>>,
    ) -> Self {
        Self::new(name, StepKind::Digest(DigestStep::new(target, expect).into_slot(into)))
    }

    /// Children run one after another
    pub fn sequence(name: impl Into<String>, children: Vec<ProcessStep>) -> Self {
        Self::new(name, StepKind::Composite(ProcessComposite::sequential(children)))
    }

    /// Children run concurrently and join
    pub fn fork(name: impl Into<String>, children: Vec<ProcessStep>) -> Self {
        Self::new(name, StepKind::Composite(ProcessComposite::fork(children)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    /// Children of a composite, empty for a leaf
    pub fn children(&self) -> &[ProcessStep] {
        match &self.kind {
            StepKind::Composite(composite) => composite.children(),
            _ => &[],
        }
    }

    /// Depth-first search by name
    pub fn find(&self, name: &str) -> Option<&ProcessStep> {
        if self.name == name {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(name))
    }

    /// True if a rollback call is allowed in the current state
    pub fn needs_rollback(&self) -> bool {
        match self.kind {
            StepKind::Composite(_) => matches!(
                self.state,
                StepState::ExecutionSucceeded | StepState::ExecutionFailed
            ),
            _ => self.state == StepState::ExecutionSucceeded,
        }
    }

    /// Run the step once
    pub fn execute<'a>(&'a mut self, env: &'a ExecutionEnv) -> BoxFuture<'a, Result<(), StepFailure>> {
        async move {
            if self.state != StepState::Ready {
                let error = ProcessError::InvalidState {
                    step: self.name.clone(),
                    expected: StepState::Ready.as_str(),
                    actual: self.state,
                };
                return Err(StepFailure::from_error(&self.name, error));
            }

            let env = env.with_log(env.log().step(&self.name));
            self.state = StepState::Executing;
            debug!(parent: env.log().span(), "Executing");

            let name = self.name.as_str();
            let result = match &mut self.kind {
                StepKind::Composite(composite) => composite.execute(&env).await,
                leaf => match env.abort_signal().reason() {
                    Some(reason) => Err(StepFailure::cancelled(reason)),
                    None => execute_leaf(leaf, name, &env)
                        .await
                        .map_err(|e| StepFailure::from_error(name, e)),
                },
            };

            match &result {
                Ok(()) => {
                    self.state = StepState::ExecutionSucceeded;
                    debug!(parent: env.log().span(), "Execution succeeded");
                }
                Err(failure) => {
                    self.state = StepState::ExecutionFailed;
                    if failure.is_fatal() {
                        error!(parent: env.log().span(), error = %failure.error, "Execution failed");
                    } else {
                        warn!(parent: env.log().span(), reason = %failure.reason, "Execution cancelled");
                    }
                }
            }
            result
        }
        .boxed()
    }

    /// Compensate a finished step
    ///
    /// Compensation failures are returned, never raised; the sweep goes on.
    pub fn rollback<'a>(
        &'a mut self,
        env: &'a ExecutionEnv,
        reason: &'a RollbackReason,
    ) -> BoxFuture<'a, ProcessResult<Vec<RollbackFailure>>> {
        async move {
            if !self.needs_rollback() {
                return Err(ProcessError::InvalidState {
                    step: self.name.clone(),
                    expected: StepState::ExecutionSucceeded.as_str(),
                    actual: self.state,
                });
            }

            let env = env.with_log(env.log().step(&self.name));
            self.state = StepState::RollingBack;
            debug!(parent: env.log().span(), reason = %reason, "Rolling back");

            let failures = match &mut self.kind {
                StepKind::Composite(composite) => composite.rollback(&env, reason).await,
                leaf => match rollback_leaf(leaf, &env).await {
                    Ok(()) => Vec::new(),
                    Err(message) => vec![RollbackFailure::new(self.name.clone(), message)],
                },
            };

            if failures.is_empty() {
                self.state = StepState::RollbackSucceeded;
            } else {
                self.state = StepState::RollbackFailed;
                for failure in &failures {
                    error!(parent: env.log().span(), %failure, "Rollback failed");
                }
            }
            Ok(failures)
        }
        .boxed()
    }
}

async fn execute_leaf(kind: &mut StepKind, name: &str, env: &ExecutionEnv) -> ProcessResult<()> {
    match kind {
        StepKind::Put(step) => step.execute(name, env).await,
        StepKind::Remove(step) => step.execute(name, env).await,
        StepKind::Get(step) => step.execute(name, env).await,
        StepKind::Digest(step) => step.execute(name, env).await,
        StepKind::Composite(_) => Ok(()),
    }
}

async fn rollback_leaf(kind: &mut StepKind, env: &ExecutionEnv) -> Result<(), String> {
    match kind {
        StepKind::Put(step) => step.rollback(env).await,
        StepKind::Remove(step) => step.rollback(env).await,
        // reads have nothing to compensate
        StepKind::Get(_) | StepKind::Digest(_) | StepKind::Composite(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_data::{ProtectionKeys, VersionedEntry};
    use crate::test_utils::TestNetwork;

    fn address() -> ContentAddress {
        ContentAddress::hashed("location", "content")
    }

    #[tokio::test]
    async fn test_put_step_lifecycle() {
        let network = TestNetwork::new();
        let env = network.env();
        let mut step = ProcessStep::put(
            "put",
            address(),
            VersionedEntry::new(b"data".to_vec()),
            ProtectionKeys::unprotected(),
        );
        assert_eq!(step.state(), StepState::Ready);

        step.execute(&env).await.unwrap();
        assert_eq!(step.state(), StepState::ExecutionSucceeded);
        assert_eq!(network.digest_len(Target::all(address())).await, 1);

        let reason = RollbackReason::new("test", "undo");
        let failures = step.rollback(&env, &reason).await.unwrap();
        assert!(failures.is_empty());
        assert_eq!(step.state(), StepState::RollbackSucceeded);
        assert_eq!(network.digest_len(Target::all(address())).await, 0);
    }

    #[tokio::test]
    async fn test_execute_twice_is_invalid() {
        let network = TestNetwork::new();
        let env = network.env();
        let mut step = ProcessStep::digest("digest", Target::all(address()), DigestExpectation::Any);

        step.execute(&env).await.unwrap();
        let failure = step.execute(&env).await.unwrap_err();
        assert!(matches!(failure.error, ProcessError::InvalidState { .. }));
        assert!(failure.is_fatal());
        assert_eq!(step.state(), StepState::ExecutionSucceeded);
    }

    #[tokio::test]
    async fn test_rollback_before_execute_is_invalid() {
        let network = TestNetwork::new();
        let env = network.env();
        let mut step = ProcessStep::digest("digest", Target::all(address()), DigestExpectation::Any);

        let reason = RollbackReason::new("test", "undo");
        let err = step.rollback(&env, &reason).await.unwrap_err();
        assert_eq!(
            err,
            ProcessError::InvalidState {
                step: "digest".to_string(),
                expected: "execution_succeeded",
                actual: StepState::Ready,
            }
        );
        assert_eq!(step.state(), StepState::Ready);
    }

    #[tokio::test]
    async fn test_failed_expectation_cancels() {
        let network = TestNetwork::new();
        let env = network.env();
        let mut step = ProcessStep::digest("check", Target::all(address()), DigestExpectation::NonEmpty);

        let failure = step.execute(&env).await.unwrap_err();
        assert!(!failure.is_fatal());
        assert_eq!(failure.reason.step, "check");
        assert_eq!(step.state(), StepState::ExecutionFailed);
        assert!(!step.needs_rollback());
    }

    #[tokio::test]
    async fn test_abort_cancels_next_leaf() {
        let network = TestNetwork::new();
        let env = network.env();
        env.abort_signal().trigger(RollbackReason::new("external", "user abort"));

        let mut step = ProcessStep::digest("digest", Target::all(address()), DigestExpectation::Any);
        let failure = step.execute(&env).await.unwrap_err();
        assert_eq!(failure.reason, RollbackReason::new("external", "user abort"));
    }

    #[tokio::test]
    async fn test_double_consume_is_fatal() {
        const FETCHED: Slot<StoredEntry> = Slot::new("fetched");
        let network = TestNetwork::new();
        let env = network.env();
        network.seed_entry(address(), b"v1").await;

        let mut get = ProcessStep::get("get", Target::all(address()), FETCHED);
        get.execute(&env).await.unwrap();

        let derive = |stored: StoredEntry| -> Result<VersionedEntry, String> {
            Ok(stored.entry.successor(b"v2".to_vec()))
        };
        let mut first = ProcessStep::put("first", address(), PutContent::derived(FETCHED, derive), ProtectionKeys::unprotected());
        let mut second = ProcessStep::put("second", address(), PutContent::derived(FETCHED, derive), ProtectionKeys::unprotected());

        first.execute(&env).await.unwrap();
        let failure = second.execute(&env).await.unwrap_err();
        assert!(failure.is_fatal());
        assert!(matches!(failure.error, ProcessError::Context(_)));
    }
}
