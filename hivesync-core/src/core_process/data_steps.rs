/*
    Data steps - the leaf steps of a process

    Responsibilities:
    `data_steps.rs` implements the leaf variants and their compensations:

    - Put: writes an entry (literal, or derived from a context slot); rollback
      takes the put back through the data manager, which also puts the
      previous protector back in force
    - Remove: captures the targeted entries first; rollback re-puts them under
      the protector they had. A remove reported as failed puts back whatever
      it did take before cancelling
    - Get: stores the fetched entry in a typed slot, optionally requiring it
    - Digest: checks the keys present against an expectation

    Operation-level failures (rejected put, nothing to remove, missing entry)
    cancel the step. A failure that could not clean up after itself cancels
    dirty, carrying what it left behind. Context misuse is fatal.
*/

use std::collections::BTreeSet;
use std::fmt;

use super::context::Slot;
use super::env::ExecutionEnv;
use super::errors::{ProcessError, ProcessResult};
use super::reason::RollbackReason;
use crate::core_data::{
    DataError, ProtectionKeyPair, ProtectionKeys, StoredEntry, UndoOutcome, VersionedEntry,
};
use crate::core_dht::{ContentAddress, FourPartKey, Target};
use tracing::{debug, warn};

/// Cancel `step` with a recoverable reason
pub fn cancel(step: &str, message: impl Into<String>) -> ProcessError {
    ProcessError::Cancelled(RollbackReason::new(step, message))
}

/// Pure transformation of a fetched entry into the revision to write
pub type Derive = Box<dyn Fn(StoredEntry) -> Result<VersionedEntry, String> + Send + Sync>;

/// What a put step writes
pub enum PutContent {
    Entry(VersionedEntry),
    /// Consume `from` and transform it; an `Err` refuses the write
    Derived { from: Slot<StoredEntry>, derive: Derive },
}

impl PutContent {
    pub fn derived<F>(from: Slot<StoredEntry>, derive: F) -> Self
    where
        F: Fn(StoredEntry) -> Result<VersionedEntry, String> + Send + Sync + 'static,
    {
        PutContent::Derived { from, derive: Box::new(derive) }
    }
}

impl From<VersionedEntry> for PutContent {
    fn from(entry: VersionedEntry) -> Self {
        PutContent::Entry(entry)
    }
}

impl fmt::Debug for PutContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutContent::Entry(entry) => f.debug_tuple("Entry").field(entry).finish(),
            PutContent::Derived { from, .. } => f.debug_struct("Derived").field("from", from).finish(),
        }
    }
}

/// Where a mutating step gets its protection keys
#[derive(Debug, Clone)]
pub enum ProtectionSource {
    Keys(ProtectionKeys),
    /// Ask the process's key manager; `rotate_to` installs a new protector
    Managed { rotate_to: Option<ProtectionKeyPair> },
    /// Consume the keys from a context slot
    Slot(Slot<ProtectionKeys>),
}

impl ProtectionSource {
    fn resolve(&self, step: &str, address: &ContentAddress, env: &ExecutionEnv) -> ProcessResult<ProtectionKeys> {
        match self {
            ProtectionSource::Keys(keys) => Ok(keys.clone()),
            ProtectionSource::Managed { rotate_to: None } => {
                env.keys().current(address).map_err(|e| cancel(step, e.to_string()))
            }
            ProtectionSource::Managed { rotate_to: Some(new) } => env
                .keys()
                .transition(address, new.clone())
                .map_err(|e| cancel(step, e.to_string())),
            ProtectionSource::Slot(slot) => Ok(env.context().consume(*slot)?),
        }
    }
}

impl From<ProtectionKeys> for ProtectionSource {
    fn from(keys: ProtectionKeys) -> Self {
        ProtectionSource::Keys(keys)
    }
}

#[derive(Debug)]
struct Written {
    key: FourPartKey,
    keys: ProtectionKeys,
}

/// Write one revision
#[derive(Debug)]
pub struct PutStep {
    address: ContentAddress,
    content: PutContent,
    protection: ProtectionSource,
    written: Option<Written>,
}

impl PutStep {
    pub fn new(address: ContentAddress, content: PutContent, protection: ProtectionSource) -> Self {
        PutStep { address, content, protection, written: None }
    }

    /// Key written by a successful execution
    pub fn written_key(&self) -> Option<FourPartKey> {
        self.written.as_ref().map(|w| w.key)
    }

    pub(crate) async fn execute(&mut self, step: &str, env: &ExecutionEnv) -> ProcessResult<()> {
        let mut entry = match &self.content {
            PutContent::Entry(entry) => entry.clone(),
            PutContent::Derived { from, derive } => {
                let source = env.context().consume(*from)?;
                derive(source).map_err(|message| cancel(step, message))?
            }
        };
        let keys = self.protection.resolve(step, &self.address, env)?;

        let key = env.data().put(self.address, &mut entry, &keys).await.map_err(|e| {
            let reason = RollbackReason::new(step, e.to_string());
            match e {
                DataError::CleanupFailed { cleanup, .. } => {
                    ProcessError::CancelledDirty { reason, residue: cleanup }
                }
                _ => ProcessError::Cancelled(reason),
            }
        })?;
        env.keys().record_put(self.address, &keys);
        self.written = Some(Written { key, keys });
        Ok(())
    }

    pub(crate) async fn rollback(&mut self, env: &ExecutionEnv) -> Result<(), String> {
        let Some(written) = self.written.take() else {
            return Ok(());
        };
        match env.data().undo_put(written.key, &written.keys).await? {
            UndoOutcome::Emptied => env.keys().record_remove(self.address, true),
            UndoOutcome::Kept => {}
            UndoOutcome::Restored(restore) => {
                env.keys().record_put(self.address, &restore);
                debug!(parent: env.log().span(), address = %self.address, "Protector restored");
            }
        }
        Ok(())
    }
}

/// Remove one version or a range of versions
#[derive(Debug)]
pub struct RemoveStep {
    target: Target,
    protection: ProtectionSource,
    removed: Vec<StoredEntry>,
    keys: Option<ProtectionKeys>,
}

impl RemoveStep {
    pub fn new(target: Target, protection: ProtectionSource) -> Self {
        RemoveStep { target, protection, removed: Vec::new(), keys: None }
    }

    /// Entries removed by a successful execution
    pub fn removed(&self) -> &[StoredEntry] {
        &self.removed
    }

    pub(crate) async fn execute(&mut self, step: &str, env: &ExecutionEnv) -> ProcessResult<()> {
        let address = self.target.address();
        let keys = self.protection.resolve(step, &address, env)?;

        let entries = env
            .data()
            .get_entries(self.target)
            .await
            .map_err(|e| cancel(step, e.to_string()))?;
        if !env.data().remove(self.target, &keys).await {
            let reason = RollbackReason::new(step, format!("remove of {} failed", address));
            if entries.is_empty() {
                return Err(ProcessError::Cancelled(reason));
            }
            // the overlay may have removed some entries before reporting failure
            return Err(match self.restore(entries, &keys, env).await {
                Ok(()) => ProcessError::Cancelled(reason),
                Err(residue) => ProcessError::CancelledDirty { reason, residue },
            });
        }

        let slot_empty = env
            .data()
            .digest(Target::all(address))
            .await
            .map(|keys| keys.is_empty())
            .unwrap_or(false);
        env.keys().record_remove(address, slot_empty);
        self.removed = entries;
        self.keys = Some(keys);
        Ok(())
    }

    pub(crate) async fn rollback(&mut self, env: &ExecutionEnv) -> Result<(), String> {
        let Some(keys) = self.keys.take() else {
            return Ok(());
        };
        let removed = std::mem::take(&mut self.removed);
        self.restore(removed, &keys, env).await
    }

    /// Put back the captured entries the slot no longer holds, under the
    /// protector they had
    async fn restore(
        &self,
        entries: Vec<StoredEntry>,
        keys: &ProtectionKeys,
        env: &ExecutionEnv,
    ) -> Result<(), String> {
        let address = self.target.address();
        let restore = match keys.old.clone() {
            Some(pair) => ProtectionKeys::keep(pair),
            None => ProtectionKeys::unprotected(),
        };
        let present = env.data().digest(Target::all(address)).await.map_err(|e| e.to_string())?;

        let mut failed = 0;
        for stored in entries.into_iter().filter(|stored| !present.contains(&stored.key)) {
            let mut entry = stored.entry;
            if let Err(e) = env.data().put(address, &mut entry, &restore).await {
                warn!(parent: env.log().span(), key = %stored.key, error = %e, "Could not restore entry");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(format!("{} entries of {} could not be restored", failed, address));
        }
        env.keys().record_put(address, &restore);
        Ok(())
    }
}

/// Fetch one version or the latest of a range into a slot
#[derive(Debug)]
pub struct GetStep {
    target: Target,
    into: Slot<StoredEntry>,
    required: Option<String>,
}

impl GetStep {
    pub fn new(target: Target, into: Slot<StoredEntry>) -> Self {
        GetStep { target, into, required: None }
    }

    /// Cancel with `message` when nothing is found
    pub fn required(mut self, message: impl Into<String>) -> Self {
        self.required = Some(message.into());
        self
    }

    pub(crate) async fn execute(&mut self, step: &str, env: &ExecutionEnv) -> ProcessResult<()> {
        let address = self.target.address();
        let found = env
            .data()
            .get(self.target)
            .await
            .map_err(|e| cancel(step, e.to_string()))?;

        match found {
            Some(stored) => {
                env.keys().observe(address, stored.protector);
                env.context().produce(self.into, step, stored)?;
            }
            None => {
                if let Some(message) = &self.required {
                    return Err(cancel(step, message.clone()));
                }
                env.keys().observe(address, None);
            }
        }
        Ok(())
    }
}

/// Expected outcome of a digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestExpectation {
    Any,
    Empty,
    NonEmpty,
    Count(usize),
}

impl DigestExpectation {
    pub fn check(&self, found: usize) -> bool {
        match self {
            DigestExpectation::Any => true,
            DigestExpectation::Empty => found == 0,
            DigestExpectation::NonEmpty => found > 0,
            DigestExpectation::Count(n) => found == *n,
        }
    }
}

impl fmt::Display for DigestExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestExpectation::Any => write!(f, "any number of"),
            DigestExpectation::Empty => write!(f, "no"),
            DigestExpectation::NonEmpty => write!(f, "at least one"),
            DigestExpectation::Count(n) => write!(f, "exactly {}", n),
        }
    }
}

/// Check which keys are present
#[derive(Debug)]
pub struct DigestStep {
    target: Target,
    expect: DigestExpectation,
    into: Option<Slot<BTreeSet<FourPartKey>>>,
}

impl DigestStep {
    pub fn new(target: Target, expect: DigestExpectation) -> Self {
        DigestStep { target, expect, into: None }
    }

    /// Store the keys found in `slot`
    pub fn into_slot(mut self, slot: Slot<BTreeSet<FourPartKey>>) -> Self {
        self.into = Some(slot);
        self
    }

    pub(crate) async fn execute(&mut self, step: &str, env: &ExecutionEnv) -> ProcessResult<()> {
        let keys = env
            .data()
            .digest(self.target)
            .await
            .map_err(|e| cancel(step, e.to_string()))?;

        if !self.expect.check(keys.len()) {
            return Err(cancel(
                step,
                format!(
                    "expected {} entries at {}, found {}",
                    self.expect,
                    self.target.address(),
                    keys.len()
                ),
            ));
        }
        if let Some(slot) = self.into {
            env.context().produce(slot, step, keys)?;
        }
        Ok(())
    }
}
