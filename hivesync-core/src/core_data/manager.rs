/*
    DataManager - versioned, protected put/get/remove/digest over the overlay

    Responsibilities:
    `manager.rs` translates process-level intents into overlay calls addressed
    by four-part keys and interprets the outcome:

    - put: assigns the version key, checks the based-on chain for cycles,
      attaches the old-key proof and the new protector, and requires enough
      replica acknowledgements
    - get: one exact version, or the latest version of a range
    - remove: true only if every targeted entry is gone afterwards
    - digest / heads: keys without payload, and the concurrent chain heads

    Every overlay call is bounded by `operation_timeout`. Absence is never an
    error: an empty range reads as nothing and removes as `false`.
*/

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::data_config::DataConfig;
use super::errors::{DataError, DataResult};
use super::protection::ProtectionKeys;
use super::versioned::VersionedEntry;
use crate::core_dht::{
    ContentAddress, DhtKey, DhtRecord, DhtResult, DhtService, Digest, FourPartKey, GetRequest,
    Order, Protector, PutAck, PutRequest, RemoveRequest, Target, VersionRange,
};
use crate::logging::LogHandle;
use crate::metrics;

/// One entry as read back from the overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: FourPartKey,
    pub entry: VersionedEntry,
    /// Protector of the slot at read time
    pub protector: Option<Protector>,
}

impl StoredEntry {
    fn from_record(record: DhtRecord) -> DataResult<Self> {
        let mut entry = VersionedEntry::decode(&record.value.data)?;
        entry.version_key = Some(record.key.version);
        Ok(StoredEntry { key: record.key, entry, protector: record.protector })
    }
}

/// What undoing a put left in the slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// No version remains
    Emptied,
    /// Older versions remain under an unchanged protector
    Kept,
    /// Older versions remain and were written again under these keys
    Restored(ProtectionKeys),
}

/// Versioned access to the overlay
#[derive(Clone)]
pub struct DataManager {
    dht: Arc<dyn DhtService>,
    config: DataConfig,
    log: LogHandle,
}

impl DataManager {
    pub fn new(dht: Arc<dyn DhtService>, config: DataConfig, log: LogHandle) -> Self {
        DataManager { dht, config, log }
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    /// Await an overlay call within the configured timeout
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> DataResult<T>
    where
        F: Future<Output = DhtResult<T>>,
    {
        let timer = metrics::Timer::new(operation);
        let result = match tokio::time::timeout(self.config.operation_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DataError::Dht(e)),
            Err(_) => Err(DataError::Timeout { operation, timeout: self.config.operation_timeout }),
        };
        timer.stop();
        metrics::record_dht_operation(operation, result.is_ok());
        result
    }

    /// Store `entry` in `address`, assigning its version key if absent
    ///
    /// Returns the four-part key written. A put acknowledged by too few
    /// replicas is taken back before the error is returned; if that fails too
    /// the error is `CleanupFailed`.
    pub async fn put(
        &self,
        address: ContentAddress,
        entry: &mut VersionedEntry,
        keys: &ProtectionKeys,
    ) -> DataResult<FourPartKey> {
        let key = address.key(entry.ensure_version_key());
        if self.config.validate_chains {
            self.check_chain(&key, entry.based_on_key).await?;
        }
        let ack = self.write(key, entry, keys).await?;
        if let Err(shortfall) = self.check_acks(&key, &ack, self.config.required_acks) {
            if ack.acks == 0 {
                return Err(shortfall);
            }
            // some replicas applied the write: take it back on those
            return match self.undo_write(key, keys, ack.acks).await {
                Ok(outcome) => {
                    debug!(parent: self.log.span(), key = %key, ?outcome, "Partial put taken back");
                    Err(shortfall)
                }
                Err(cleanup) => {
                    warn!(parent: self.log.span(), key = %key, error = %cleanup, "Partial put left behind");
                    Err(DataError::CleanupFailed { key, reason: shortfall.to_string(), cleanup })
                }
            };
        }

        debug!(parent: self.log.span(), key = %key, acks = ack.acks, "Put succeeded");
        Ok(key)
    }

    /// Send one put to the overlay; only a rejection is an error here
    async fn write(
        &self,
        key: FourPartKey,
        entry: &VersionedEntry,
        keys: &ProtectionKeys,
    ) -> DataResult<PutAck> {
        let mut request = PutRequest::new(key, entry.to_value()?);
        request.new_protector = keys.new_protector();
        request.proof = keys.prove(&request.signing_bytes());

        self.bounded("put", self.dht.put(request)).await.map_err(|e| {
            warn!(parent: self.log.span(), key = %key, error = %e, "Put rejected");
            DataError::PutFailed { key, reason: e.to_string() }
        })
    }

    fn check_acks(&self, key: &FourPartKey, ack: &PutAck, required: usize) -> DataResult<()> {
        if ack.acks >= required {
            return Ok(());
        }
        warn!(
            parent: self.log.span(),
            key = %key,
            acks = ack.acks,
            required,
            "Put not acknowledged by enough replicas"
        );
        Err(DataError::PutFailed {
            key: *key,
            reason: format!(
                "acknowledged by {} of {} replicas, {} required",
                ack.acks, ack.replicas, required
            ),
        })
    }

    /// Take back a successful put of `key` made under `keys`
    ///
    /// Removes the version with the keys reversed. If the put changed the
    /// slot's protector and older versions remain, the head is written again
    /// so the previous protector guards them.
    pub async fn undo_put(&self, key: FourPartKey, keys: &ProtectionKeys) -> Result<UndoOutcome, String> {
        self.undo_write(key, keys, self.config.required_acks).await
    }

    /// `undo_put` whose protector restore must reach `required` replicas
    async fn undo_write(
        &self,
        key: FourPartKey,
        keys: &ProtectionKeys,
        required: usize,
    ) -> Result<UndoOutcome, String> {
        let address = key.address();
        if !self.remove(Target::key(key), &keys.reversed()).await {
            return Err(format!("could not remove {}", key));
        }

        let Some(head) = self.get_latest(address).await.map_err(|e| e.to_string())? else {
            return Ok(UndoOutcome::Emptied);
        };
        if !keys.rotates() {
            return Ok(UndoOutcome::Kept);
        }

        // older versions are still guarded by the key this put installed
        let Some(previous) = keys.old.clone() else {
            return Err(format!("{} was unprotected before the put and stays protected", address));
        };
        let restore = ProtectionKeys { old: keys.new.clone(), new: Some(previous) };
        let ack = self
            .write(head.key, &head.entry, &restore)
            .await
            .map_err(|e| format!("could not restore protector: {}", e))?;
        self.check_acks(&head.key, &ack, required)
            .map_err(|e| format!("could not restore protector: {}", e))?;
        debug!(parent: self.log.span(), address = %address, "Protector restored");
        Ok(UndoOutcome::Restored(restore))
    }

    /// Reject `key` if walking based-on links from `based_on` reaches it or loops
    async fn check_chain(&self, key: &FourPartKey, based_on: Option<DhtKey>) -> DataResult<()> {
        let Some(mut cursor) = based_on else {
            return Ok(());
        };
        if cursor == key.version {
            return Err(DataError::ChainCycle(*key));
        }

        let links: HashMap<DhtKey, Option<DhtKey>> = self
            .links(Target::all(key.address()))
            .await?
            .into_iter()
            .map(|(k, parent)| (k.version, parent))
            .collect();

        let mut visited = HashSet::new();
        loop {
            if cursor == key.version || !visited.insert(cursor) {
                warn!(parent: self.log.span(), key = %key, depth = visited.len(), "Version chain does not terminate");
                return Err(DataError::ChainCycle(*key));
            }
            match links.get(&cursor) {
                Some(Some(parent)) => cursor = *parent,
                _ => return Ok(()),
            }
        }
    }

    /// One exact version, or the greatest version of a range
    pub async fn get(&self, target: Target) -> DataResult<Option<StoredEntry>> {
        let request = match target {
            Target::Key(_) => GetRequest::new(target),
            Target::Range { .. } => GetRequest::new(target).descending().limit(1),
        };
        let records = self.bounded("get", self.dht.get(request)).await?;
        let found = records.into_iter().next().map(StoredEntry::from_record).transpose()?;
        trace!(parent: self.log.span(), found = found.is_some(), "Get");
        Ok(found)
    }

    /// Latest version of a slot
    pub async fn get_latest(&self, address: ContentAddress) -> DataResult<Option<StoredEntry>> {
        self.get(Target::all(address)).await
    }

    /// Versions of a slot within `range`
    pub async fn get_range(
        &self,
        address: ContentAddress,
        range: VersionRange,
        order: Order,
        limit: Option<usize>,
    ) -> DataResult<Vec<StoredEntry>> {
        let mut request = GetRequest::new(Target::range(address, range));
        request.order = order;
        request.limit = limit;
        self.bounded("get", self.dht.get(request))
            .await?
            .into_iter()
            .map(StoredEntry::from_record)
            .collect()
    }

    /// Every entry matched by `target`, ascending
    pub async fn get_entries(&self, target: Target) -> DataResult<Vec<StoredEntry>> {
        self.bounded("get", self.dht.get(GetRequest::new(target)))
            .await?
            .into_iter()
            .map(StoredEntry::from_record)
            .collect()
    }

    /// Remove one version or every version within a range
    ///
    /// True only if the targeted entries existed, the overlay removed all of
    /// them and a digest afterwards finds none.
    pub async fn remove(&self, target: Target, keys: &ProtectionKeys) -> bool {
        let before = match self.digest(target).await {
            Ok(before) => before,
            Err(e) => {
                warn!(parent: self.log.span(), error = %e, "Remove pre-check failed");
                return false;
            }
        };
        if before.is_empty() {
            debug!(parent: self.log.span(), address = %target.address(), "Nothing to remove");
            return false;
        }

        let mut request = RemoveRequest::new(target);
        request.proof = keys.prove(&request.signing_bytes());
        let removed = match self.bounded("remove", self.dht.remove(request)).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(parent: self.log.span(), address = %target.address(), error = %e, "Remove rejected");
                return false;
            }
        };
        if removed < before.len() {
            warn!(
                parent: self.log.span(),
                removed,
                expected = before.len(),
                "Remove was partial"
            );
            return false;
        }

        match self.digest(target).await {
            Ok(after) if after.is_empty() => {
                debug!(parent: self.log.span(), address = %target.address(), removed, "Remove succeeded");
                true
            }
            Ok(after) => {
                warn!(parent: self.log.span(), remaining = after.len(), "Entries survived remove");
                false
            }
            Err(e) => {
                warn!(parent: self.log.span(), error = %e, "Remove post-check failed");
                false
            }
        }
    }

    async fn links(&self, target: Target) -> DataResult<Digest> {
        self.bounded("digest", self.dht.digest(target)).await
    }

    /// Keys present for `target`, without payload
    pub async fn digest(&self, target: Target) -> DataResult<BTreeSet<FourPartKey>> {
        Ok(self.links(target).await?.into_keys().collect())
    }

    /// Versions of a slot no other version is based on
    pub async fn heads(&self, address: ContentAddress) -> DataResult<BTreeSet<FourPartKey>> {
        let links = self.links(Target::all(address)).await?;
        let referenced: HashSet<DhtKey> = links.values().flatten().copied().collect();
        Ok(links.into_keys().filter(|key| !referenced.contains(&key.version)).collect())
    }
}
