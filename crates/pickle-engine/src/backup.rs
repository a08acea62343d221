//! One-way backup convergence between two buckets.
//!
//! `Backup(source -> target)` replicates the logical archive set, meaning
//! data objects and their checksum sidecars, and propagates lock extensions
//! without ever violating the target's object lock invariants. The pass is
//! idempotent: with an unchanged source, running it again leaves the target
//! untouched.

use std::collections::BTreeMap;

use tracing::{debug, info};

use pickle_store::{
    Clock, ObjectIdentifier, ObjectStore, ObjectVersionInfo, Retention, VersionListing,
    stream_copy,
};

use crate::engine::retention_from;
use crate::error::EngineError;
use crate::naming::{is_checksum_key, is_data_key};

/// Run one convergence pass from `source` to `target`.
///
/// Three sets are computed over the authoritative (oldest) version of each
/// key:
///
/// - **upload**: archive keys on the source but not the target are
///   stream-copied, locked on the target until `now + object_lock_hours`;
/// - **lock-extend**: keys on both sides have the target's retention raised
///   to the source's expiry whenever the source's is later;
/// - **delete**: target keys with no source counterpart, plus extra stored
///   versions at any target key, go into one batched delete. The target
///   refuses entries still under lock; those are retried by a later pass.
pub async fn run_backup(
    source: &dyn ObjectStore,
    target: &dyn ObjectStore,
    object_lock_hours: i64,
    clock: &dyn Clock,
) -> Result<(), EngineError> {
    let source_listing = source.list_all_object_versions("").await?;
    let target_listing = target.list_all_object_versions("").await?;

    // The replicated set is the archive object family only.
    let source_keepers = keepers(&source_listing, |key| {
        is_data_key(key) || is_checksum_key(key)
    });
    // On the target everything is subject to convergence, so stray objects
    // are removed rather than preserved.
    let (target_keepers, target_duplicates) = keepers_and_duplicates(&target_listing, |_| true);

    // Upload set: present on the source, absent on the target.
    let upload_retention = retention_from(clock, object_lock_hours);
    let mut uploaded = 0usize;
    for (key, keeper) in &source_keepers {
        if target_keepers.contains_key(key) {
            continue;
        }
        stream_copy(source, target, key, &keeper.version_id, &upload_retention)
            .await
            .map_err(|source| EngineError::CopyObject {
                key: key.clone(),
                source,
            })?;
        uploaded += 1;
    }

    // Lock-extend set: present on both; the backup retains at least as long
    // as the primary.
    let mut extended = 0usize;
    for (key, keeper) in &source_keepers {
        let Some(target_keeper) = target_keepers.get(key) else {
            continue;
        };
        let source_meta = source.head_object(key, Some(&keeper.version_id)).await?;
        let Some(source_retention) = source_meta.retention else {
            continue;
        };

        let target_meta = target
            .head_object(key, Some(&target_keeper.version_id))
            .await?;
        let needs_extension = target_meta
            .retention
            .is_none_or(|current| source_retention.retain_until > current.retain_until);
        if !needs_extension {
            continue;
        }

        target
            .put_object_retention(
                key,
                &target_keeper.version_id,
                &Retention::compliance_until(source_retention.retain_until),
            )
            .await
            .map_err(|source| EngineError::SetRetention {
                key: key.clone(),
                source,
            })?;
        extended += 1;
    }

    // Delete set: gone from the source, or a duplicate version.
    let mut to_delete: Vec<ObjectIdentifier> = Vec::new();
    for (key, keeper) in &target_keepers {
        if !source_keepers.contains_key(key) {
            to_delete.push(ObjectIdentifier::versioned(&keeper.key, &keeper.version_id));
        }
    }
    for duplicate in &target_duplicates {
        to_delete.push(ObjectIdentifier::versioned(
            &duplicate.key,
            &duplicate.version_id,
        ));
    }

    let submitted = to_delete.len();
    let mut still_locked = 0usize;
    if !to_delete.is_empty() {
        let result = target
            .delete_objects(to_delete)
            .await
            .map_err(|source| EngineError::DeleteObjects { source })?;
        for entry in &result.errors {
            if entry.is_lock_violation() {
                still_locked += 1;
                debug!(key = %entry.key, "backup delete refused, object still locked");
            } else {
                debug!(key = %entry.key, code = %entry.code, "backup delete refused");
            }
        }
    }

    info!(
        uploaded,
        extended,
        submitted,
        still_locked,
        "backup pass complete"
    );
    Ok(())
}

/// Authoritative (oldest) version per key, for keys the filter accepts.
fn keepers(
    listing: &VersionListing,
    filter: impl Fn(&str) -> bool,
) -> BTreeMap<String, ObjectVersionInfo> {
    keepers_and_duplicates(listing, filter).0
}

/// Oldest version per key plus every newer stored version at the same key.
fn keepers_and_duplicates(
    listing: &VersionListing,
    filter: impl Fn(&str) -> bool,
) -> (BTreeMap<String, ObjectVersionInfo>, Vec<ObjectVersionInfo>) {
    let mut keepers: BTreeMap<String, ObjectVersionInfo> = BTreeMap::new();
    let mut duplicates: Vec<ObjectVersionInfo> = Vec::new();

    for version in listing.versions_oldest_first() {
        if !filter(&version.key) {
            continue;
        }
        if keepers.contains_key(&version.key) {
            duplicates.push(version.clone());
        } else {
            keepers.insert(version.key.clone(), version.clone());
        }
    }

    (keepers, duplicates)
}
