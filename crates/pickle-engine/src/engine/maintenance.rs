//! The maintenance pass: registry cleanup, retention extension, physical
//! reclamation.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use pickle_store::{ObjectIdentifier, ObjectVersionInfo};

use super::Engine;
use crate::error::{EngineError, ErrorList};
use crate::naming::{checksum_key, is_checksum_key, is_data_key};

impl Engine {
    /// Run one convergence pass over the bucket.
    ///
    /// Four phases over a single version-listing snapshot, processed oldest
    /// first:
    ///
    /// 0. Drop registry entries whose data object no longer exists and
    ///    re-persist. A failure here aborts the pass.
    /// 1. Classify: per key the oldest version is the keeper, anything newer
    ///    is a duplicate; checksum keepers without a matching data keeper
    ///    are orphans.
    /// 2. Extend retention on every data keeper not marked deleted, and on
    ///    its sidecar. Failures accumulate.
    /// 3. Submit one batched delete of registry-marked pairs, orphans, and
    ///    duplicates. Lock refusals are expected per-entry results; only a
    ///    call-level failure accumulates.
    ///
    /// Returns the accumulated Phase 2 and Phase 3 failures, joined.
    pub async fn run_maintenance(&mut self) -> Result<(), EngineError> {
        let listing = self.load_versions().await?;
        let mut registry = self.registry().await?;

        // Classify the snapshot. Oldest first, so the first occurrence of a
        // key is its authoritative version.
        let mut data_keepers: BTreeMap<String, ObjectVersionInfo> = BTreeMap::new();
        let mut checksum_keepers: BTreeMap<String, ObjectVersionInfo> = BTreeMap::new();
        let mut duplicates: Vec<ObjectVersionInfo> = Vec::new();

        for version in listing.versions_oldest_first() {
            let keepers = if is_data_key(&version.key) {
                &mut data_keepers
            } else if is_checksum_key(&version.key) {
                &mut checksum_keepers
            } else {
                continue;
            };

            if keepers.contains_key(&version.key) {
                duplicates.push(version.clone());
            } else {
                keepers.insert(version.key.clone(), version.clone());
            }
        }

        // Phase 0: the registry must only list keys that still exist.
        let changed = registry.retain(|key| data_keepers.contains_key(key));
        if changed {
            self.persist_registry(registry.clone())
                .await
                .map_err(|err| EngineError::PersistRegistry {
                    source: Box::new(err),
                })?;
        }

        // Checksum keepers with no matching data keeper are orphans.
        let mut orphaned_checksums = checksum_keepers.clone();
        for key in data_keepers.keys() {
            orphaned_checksums.remove(&checksum_key(key));
        }

        let mut failures = ErrorList::default();

        // Phase 2: keep every live archive locked for another window.
        let retention = self.lock_retention();
        let mut extended = 0usize;
        for (key, keeper) in &data_keepers {
            if registry.contains(key) {
                continue;
            }

            if let Err(source) = self
                .store
                .put_object_retention(key, &keeper.version_id, &retention)
                .await
            {
                failures.push(EngineError::SetRetention {
                    key: key.clone(),
                    source,
                });
            } else {
                extended += 1;
            }

            if let Some(sidecar) = checksum_keepers.get(&checksum_key(key)) {
                if let Err(source) = self
                    .store
                    .put_object_retention(&sidecar.key, &sidecar.version_id, &retention)
                    .await
                {
                    failures.push(EngineError::SetRetention {
                        key: sidecar.key.clone(),
                        source,
                    });
                }
            }
        }

        // Phase 3: one batch for everything that should no longer exist.
        let mut to_delete: Vec<ObjectIdentifier> = Vec::new();
        for key in registry.iter() {
            if let Some(keeper) = data_keepers.get(key) {
                to_delete.push(ObjectIdentifier::versioned(&keeper.key, &keeper.version_id));
            }
            if let Some(sidecar) = checksum_keepers.get(&checksum_key(key)) {
                to_delete.push(ObjectIdentifier::versioned(
                    &sidecar.key,
                    &sidecar.version_id,
                ));
            }
        }
        for orphan in orphaned_checksums.values() {
            to_delete.push(ObjectIdentifier::versioned(&orphan.key, &orphan.version_id));
        }
        for duplicate in &duplicates {
            to_delete.push(ObjectIdentifier::versioned(
                &duplicate.key,
                &duplicate.version_id,
            ));
        }

        let submitted = to_delete.len();
        let mut still_locked = 0usize;
        if !to_delete.is_empty() {
            match self.store.delete_objects(to_delete).await {
                Ok(result) => {
                    for entry in &result.errors {
                        if entry.is_lock_violation() {
                            // Expected: the lock has not lapsed yet. The next
                            // pass retries.
                            still_locked += 1;
                            debug!(key = %entry.key, "delete refused, object still locked");
                        } else {
                            warn!(
                                key = %entry.key,
                                code = %entry.code,
                                message = %entry.message,
                                "delete refused"
                            );
                        }
                    }
                }
                Err(source) => failures.push(EngineError::DeleteObjects { source }),
            }
        }

        self.invalidate_versions();
        info!(
            extended,
            submitted,
            still_locked,
            registry_entries = registry.len(),
            "maintenance pass complete"
        );
        failures.into_result()
    }
}
