/*
    Process - top-level driver of a step tree

    Responsibilities:
    `process.rs` runs the root step on its own task, and on failure runs the
    rollback sweep over everything that finished. Callers observe the status
    through a watch channel and collect a `ProcessReport` with `wait`.

    Final status:
    - Succeeded: every step executed
    - Failed: a step failed and every compensation succeeded
    - FailedDirty: at least one compensation failed, or a failing step left
      a partial effect it could not take back
*/

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::context::ProcessContext;
use super::env::ExecutionEnv;
use super::errors::{ProcessError, ProcessResult};
use super::reason::{RollbackFailure, RollbackReason};
use super::state::ProcessStatus;
use super::step::ProcessStep;
use crate::metrics;

/// Origin recorded in the reason of an external abort
pub const ABORT_ORIGIN: &str = "abort";

/// Outcome of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub process_id: Uuid,
    pub name: String,
    pub status: ProcessStatus,
    /// Why rollback started, if it did
    pub reason: Option<RollbackReason>,
    /// The failure was a contract violation rather than a cancellation
    pub fatal: bool,
    pub rollback_failures: Vec<RollbackFailure>,
}

impl ProcessReport {
    pub fn is_success(&self) -> bool {
        self.status == ProcessStatus::Succeeded
    }
}

/// A step tree plus the environment it runs in
pub struct Process {
    id: Uuid,
    name: String,
    env: ExecutionEnv,
    root: Option<ProcessStep>,
    status_tx: Option<watch::Sender<ProcessStatus>>,
    status_rx: watch::Receiver<ProcessStatus>,
    task: Option<JoinHandle<(ProcessStep, ProcessReport)>>,
    report: Option<ProcessReport>,
}

impl Process {
    pub fn new(name: impl Into<String>, root: ProcessStep, env: ExecutionEnv) -> Self {
        let id = Uuid::new_v4();
        let name = name.into();
        let env = env.with_log(env.log().process(&id, &name));
        let (status_tx, status_rx) = watch::channel(ProcessStatus::Ready);
        Process {
            id,
            name,
            env,
            root: Some(root),
            status_tx: Some(status_tx),
            status_rx,
            task: None,
            report: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProcessStatus {
        *self.status_rx.borrow()
    }

    /// Receiver of every status change
    pub fn subscribe(&self) -> watch::Receiver<ProcessStatus> {
        self.status_rx.clone()
    }

    pub fn context(&self) -> &ProcessContext {
        self.env.context()
    }

    /// The step tree; `None` while the process runs
    pub fn root(&self) -> Option<&ProcessStep> {
        self.root.as_ref()
    }

    /// Spawn the process on the current tokio runtime
    pub fn start(&mut self) -> ProcessResult<()> {
        if self.task.is_some() || self.report.is_some() {
            return Err(ProcessError::AlreadyStarted(self.id));
        }
        let (Some(root), Some(status)) = (self.root.take(), self.status_tx.take()) else {
            return Err(ProcessError::AlreadyStarted(self.id));
        };

        let task = tokio::spawn(drive(self.id, self.name.clone(), root, self.env.clone(), status));
        self.task = Some(task);
        Ok(())
    }

    /// Block until the process reaches a terminal status
    pub async fn wait(&mut self) -> ProcessResult<ProcessReport> {
        if let Some(report) = &self.report {
            return Ok(report.clone());
        }
        let task = self.task.take().ok_or(ProcessError::NotStarted(self.id))?;
        let (root, report) = task.await.map_err(|e| ProcessError::Join(e.to_string()))?;
        self.root = Some(root);
        self.report = Some(report.clone());
        Ok(report)
    }

    /// `start` followed by `wait`
    pub async fn run(&mut self) -> ProcessResult<ProcessReport> {
        self.start()?;
        self.wait().await
    }

    /// Ask the process to stop; the next step to execute cancels with `message`
    pub fn abort(&self, message: impl Into<String>) {
        let reason = RollbackReason::new(ABORT_ORIGIN, message);
        info!(parent: self.env.log().span(), reason = %reason, "Abort requested");
        self.env.abort_signal().trigger(reason);
    }
}

async fn drive(
    id: Uuid,
    name: String,
    mut root: ProcessStep,
    env: ExecutionEnv,
    status: watch::Sender<ProcessStatus>,
) -> (ProcessStep, ProcessReport) {
    status.send_replace(ProcessStatus::Running);
    info!(parent: env.log().span(), "Process started");

    let mut report = ProcessReport {
        process_id: id,
        name,
        status: ProcessStatus::Succeeded,
        reason: None,
        fatal: false,
        rollback_failures: Vec::new(),
    };

    if let Err(failure) = root.execute(&env).await {
        status.send_replace(ProcessStatus::RollingBack);
        warn!(parent: env.log().span(), reason = %failure.reason, "Process failed, rolling back");

        let mut failures = failure.residue.clone();
        if root.needs_rollback() {
            match root.rollback(&env, &failure.reason).await {
                Ok(mut swept) => failures.append(&mut swept),
                Err(e) => failures.push(RollbackFailure::new(root.name(), e.to_string())),
            }
        }

        report.status = if failures.is_empty() {
            ProcessStatus::Failed
        } else {
            ProcessStatus::FailedDirty
        };
        report.fatal = failure.is_fatal();
        report.reason = Some(failure.reason);
        report.rollback_failures = failures;
    }

    metrics::record_process_completed(report.status.as_str());
    metrics::record_rollback_failures(report.rollback_failures.len() as u64);
    match report.status {
        ProcessStatus::FailedDirty => error!(
            parent: env.log().span(),
            failures = report.rollback_failures.len(),
            "Process finished in an inconsistent state"
        ),
        finished => info!(parent: env.log().span(), status = %finished, "Process finished"),
    }
    status.send_replace(report.status);
    (root, report)
}
