//! Sequential and fork groups of steps
//!
//! Both modes record the order in which children finished. Rollback walks that
//! record backwards, so compensation always runs in strict reverse completion
//! order, also across the concurrent members of a fork.

use futures::stream::{FuturesUnordered, StreamExt};

use super::env::ExecutionEnv;
use super::reason::{RollbackFailure, RollbackReason};
use super::step::{ProcessStep, StepFailure};

/// How the children of a composite run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    /// In declaration order, stopping at the first failure
    Sequential,
    /// Concurrently; the group fails if any member fails
    Fork,
}

/// Ordered group of child steps
#[derive(Debug)]
pub struct ProcessComposite {
    mode: CompositeMode,
    children: Vec<ProcessStep>,
    /// Indices of children whose execution finished, in completion order
    finished: Vec<usize>,
}

impl ProcessComposite {
    pub fn sequential(children: Vec<ProcessStep>) -> Self {
        ProcessComposite { mode: CompositeMode::Sequential, children, finished: Vec::new() }
    }

    pub fn fork(children: Vec<ProcessStep>) -> Self {
        ProcessComposite { mode: CompositeMode::Fork, children, finished: Vec::new() }
    }

    pub fn mode(&self) -> CompositeMode {
        self.mode
    }

    pub fn children(&self) -> &[ProcessStep] {
        &self.children
    }

    /// Names of the children that finished executing, in completion order
    pub fn completion_order(&self) -> Vec<&str> {
        self.finished.iter().map(|&i| self.children[i].name()).collect()
    }

    pub(crate) async fn execute(&mut self, env: &ExecutionEnv) -> Result<(), StepFailure> {
        match self.mode {
            CompositeMode::Sequential => self.execute_sequential(env).await,
            CompositeMode::Fork => self.execute_fork(env).await,
        }
    }

    async fn execute_sequential(&mut self, env: &ExecutionEnv) -> Result<(), StepFailure> {
        for (index, child) in self.children.iter_mut().enumerate() {
            let result = child.execute(env).await;
            self.finished.push(index);
            result?;
        }
        Ok(())
    }

    async fn execute_fork(&mut self, env: &ExecutionEnv) -> Result<(), StepFailure> {
        let mut pending: FuturesUnordered<_> = self
            .children
            .iter_mut()
            .enumerate()
            .map(move |(index, child)| async move { (index, child.execute(env).await) })
            .collect();

        let mut failure: Option<StepFailure> = None;
        let mut residue = Vec::new();
        while let Some((index, result)) = pending.next().await {
            self.finished.push(index);
            if let Err(mut err) = result {
                residue.append(&mut err.residue);
                // a fatal failure outranks a cancellation
                let replace = match &failure {
                    None => true,
                    Some(current) => !current.is_fatal() && err.is_fatal(),
                };
                if replace {
                    failure = Some(err);
                }
            }
        }

        match failure {
            Some(mut failure) => {
                failure.residue = residue;
                Err(failure)
            }
            None => Ok(()),
        }
    }

    pub(crate) async fn rollback(&mut self, env: &ExecutionEnv, reason: &RollbackReason) -> Vec<RollbackFailure> {
        let mut failures = Vec::new();
        let order: Vec<usize> = self.finished.iter().rev().copied().collect();
        for index in order {
            let child = &mut self.children[index];
            if !child.needs_rollback() {
                continue;
            }
            match child.rollback(env, reason).await {
                Ok(mut child_failures) => failures.append(&mut child_failures),
                Err(e) => failures.push(RollbackFailure::new(child.name(), e.to_string())),
            }
        }
        failures
    }
}
