//! Archive listings: files and trash.

use std::collections::BTreeMap;

use pickle_store::VersionListing;

use super::{ArchiveEntry, Engine};
use crate::error::EngineError;
use crate::naming::{ArchiveId, parse_data_key};
use crate::registry::DeletionRegistry;

impl Engine {
    /// List archives that are not marked deleted, ordered by stored key.
    pub async fn list_files(&mut self) -> Result<Vec<ArchiveEntry>, EngineError> {
        let listing = self.load_versions().await?;
        let registry = self.registry().await?;
        Ok(collect_entries(&listing, &registry, false))
    }

    /// List archives that are marked deleted (the trash bin), ordered by
    /// stored key.
    pub async fn list_trash(&mut self) -> Result<Vec<ArchiveEntry>, EngineError> {
        let listing = self.load_versions().await?;
        let registry = self.registry().await?;
        Ok(collect_entries(&listing, &registry, true))
    }
}

/// Reduce a version listing to archive entries.
///
/// Only data keys are considered. For each key the oldest stored version is
/// the one surfaced: the archive id embedded in the key already identifies
/// one logical archive, so extra stored versions at the same key are
/// interference, not history. Among entries sharing a user-facing path, the
/// largest archive id (K-sortable, so the most recent upload) is flagged
/// `is_latest`.
fn collect_entries(
    listing: &VersionListing,
    registry: &DeletionRegistry,
    deleted: bool,
) -> Vec<ArchiveEntry> {
    let mut keepers: BTreeMap<String, ArchiveEntry> = BTreeMap::new();
    let mut latest_at_path: BTreeMap<String, ArchiveId> = BTreeMap::new();

    for version in &listing.versions {
        let Some((path, id)) = parse_data_key(&version.key) else {
            continue;
        };
        if registry.contains(&version.key) != deleted {
            continue;
        }

        // Newest-first listing order: a later insert at the same key is an
        // older version, and overwrites the newer one.
        keepers.insert(
            version.key.clone(),
            ArchiveEntry {
                key: version.key.clone(),
                path: path.to_owned(),
                archive_id: id.to_string(),
                is_latest: false,
                version_id: version.version_id.clone(),
                last_modified: version.last_modified,
                size: version.size,
            },
        );

        latest_at_path
            .entry(path.to_owned())
            .and_modify(|current| {
                if id > *current {
                    *current = id.clone();
                }
            })
            .or_insert(id);
    }

    keepers
        .into_values()
        .map(|mut entry| {
            entry.is_latest = latest_at_path
                .get(&entry.path)
                .is_some_and(|id| id.as_str() == entry.archive_id);
            entry
        })
        .collect()
}
