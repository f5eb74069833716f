//! What every step of a process sees while it runs

use std::sync::{Arc, Mutex};

use super::context::ProcessContext;
use super::reason::RollbackReason;
use crate::core_data::{DataManager, ProtectionKeyManager};
use crate::logging::LogHandle;

/// External abort request, observed by the next step to execute
#[derive(Clone, Default)]
pub struct AbortSignal {
    reason: Arc<Mutex<Option<RollbackReason>>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        AbortSignal::default()
    }

    /// Request an abort; the first reason wins
    pub fn trigger(&self, reason: RollbackReason) {
        let mut current = self.reason.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if current.is_none() {
            *current = Some(reason);
        }
    }

    pub fn reason(&self) -> Option<RollbackReason> {
        self.reason.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

/// Services and shared state handed to each step
#[derive(Clone)]
pub struct ExecutionEnv {
    data: DataManager,
    keys: Arc<ProtectionKeyManager>,
    context: Arc<ProcessContext>,
    abort: AbortSignal,
    log: LogHandle,
}

impl ExecutionEnv {
    /// Environment with an empty context
    pub fn new(data: DataManager, keys: Arc<ProtectionKeyManager>, log: LogHandle) -> Self {
        ExecutionEnv {
            data,
            keys,
            context: Arc::new(ProcessContext::new()),
            abort: AbortSignal::new(),
            log,
        }
    }

    pub fn with_context(mut self, context: ProcessContext) -> Self {
        self.context = Arc::new(context);
        self
    }

    pub fn data(&self) -> &DataManager {
        &self.data
    }

    pub fn keys(&self) -> &ProtectionKeyManager {
        &self.keys
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    pub fn log(&self) -> &LogHandle {
        &self.log
    }

    pub(crate) fn with_log(&self, log: LogHandle) -> Self {
        ExecutionEnv { log, ..self.clone() }
    }
}
