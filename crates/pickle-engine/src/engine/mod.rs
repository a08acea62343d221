//! The archive lifecycle engine.
//!
//! One [`Engine`] instance drives one bucket, single-writer. It owns two
//! in-process caches: the last version-listing snapshot and the parsed
//! deletion registry. Both are read-through; starting a new workflow means
//! constructing a fresh engine, which implicitly invalidates them.

mod download;
mod listing;
mod maintenance;
mod trash;
mod upload;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use age::x25519::{Identity, Recipient};
use pickle_store::{
    ByteStream, Clock, ObjectIdentifier, ObjectStore, PutBody, PutRequest, Retention,
    SystemClock, VersionListing, crc32c_base64,
};

use crate::error::EngineError;
use crate::integrity;
use crate::naming::REGISTRY_KEY;
use crate::registry::DeletionRegistry;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for constructing an [`Engine`].
#[derive(Clone)]
pub struct EngineConfig {
    /// The bucket this engine writes to.
    pub store: Option<Arc<dyn ObjectStore>>,
    /// The age identity whose recipient seals uploads.
    pub identity: Option<Identity>,
    /// Retention window applied on upload, restore, and each maintenance
    /// pass.
    pub object_lock_hours: i64,
    /// Time source; defaults to the system clock.
    pub clock: Option<Arc<dyn Clock>>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("store", &self.store.is_some())
            .field("identity", &self.identity.is_some())
            .field("object_lock_hours", &self.object_lock_hours)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Listing entries
// ---------------------------------------------------------------------------

/// One archive in a listing (files or trash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    /// The full stored data key.
    pub key: String,
    /// The user-facing path.
    pub path: String,
    /// The archive id embedded in the key.
    pub archive_id: String,
    /// Whether this is the most recent archive at its path.
    pub is_latest: bool,
    /// The store's version id for the authoritative version.
    pub version_id: String,
    /// When the authoritative version was stored.
    pub last_modified: DateTime<Utc>,
    /// Ciphertext size in bytes.
    pub size: u64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The archive lifecycle engine for one bucket.
pub struct Engine {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) identity: Identity,
    pub(crate) recipient: Recipient,
    pub(crate) object_lock_hours: i64,
    pub(crate) clock: Arc<dyn Clock>,
    cached_versions: Option<VersionListing>,
    cached_registry: Option<DeletionRegistry>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("object_lock_hours", &self.object_lock_hours)
            .field("snapshot_cached", &self.cached_versions.is_some())
            .field("registry_cached", &self.cached_registry.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Construct an engine, validating that a store and identity key are
    /// configured.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let store = config
            .store
            .ok_or(EngineError::NotConfigured("connection"))?;
        let identity = config
            .identity
            .ok_or(EngineError::NotConfigured("identity key"))?;
        let recipient = identity.to_public();
        Ok(Self {
            store,
            identity,
            recipient,
            object_lock_hours: config.object_lock_hours,
            clock: config.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            cached_versions: None,
            cached_registry: None,
        })
    }

    /// A COMPLIANCE retention lasting `object_lock_hours` from now.
    pub(crate) fn lock_retention(&self) -> Retention {
        Retention::compliance_until(self.clock.now() + Duration::hours(self.object_lock_hours))
    }

    /// Fetch a fresh version-listing snapshot and cache it.
    pub(crate) async fn load_versions(&mut self) -> Result<VersionListing, EngineError> {
        let listing = self.store.list_all_object_versions("").await?;
        self.cached_versions = Some(listing.clone());
        Ok(listing)
    }

    /// The cached snapshot, fetched on first use.
    pub(crate) async fn versions(&mut self) -> Result<VersionListing, EngineError> {
        match &self.cached_versions {
            Some(listing) => Ok(listing.clone()),
            None => self.load_versions().await,
        }
    }

    /// Drop the snapshot cache after a mutation the listing doesn't reflect.
    pub(crate) fn invalidate_versions(&mut self) {
        self.cached_versions = None;
    }

    /// Resolve the authoritative stored version id for a key: the oldest
    /// stored version. The archive id embedded in the key is the real
    /// version axis; any newer stored versions at the same key are
    /// interference that maintenance will reap.
    pub(crate) async fn resolve_stored_version(
        &mut self,
        key: &str,
    ) -> Result<String, EngineError> {
        let listing = self.versions().await?;

        // The listing is newest-first within a key; the last match wins.
        let mut version_id = None;
        for version in &listing.versions {
            if version.key == key {
                version_id = Some(version.version_id.clone());
            }
        }

        version_id.ok_or_else(|| EngineError::UnknownArchive {
            key: key.to_owned(),
        })
    }

    // -- deletion registry -------------------------------------------------

    /// The cached deletion registry, loaded from the newest stored version
    /// on first use.
    pub(crate) async fn registry(&mut self) -> Result<DeletionRegistry, EngineError> {
        if let Some(registry) = &self.cached_registry {
            return Ok(registry.clone());
        }

        let listing = self.versions().await?;
        let newest = listing
            .versions
            .iter()
            .find(|version| version.key == REGISTRY_KEY && version.is_latest)
            .map(|version| version.version_id.clone());

        let registry = match newest {
            // No stored registry: nothing has been deleted.
            None => DeletionRegistry::new(),
            Some(version_id) => {
                let response = self.store.get_object(REGISTRY_KEY, Some(&version_id)).await?;
                let body = collect_body(response.body).await?;
                DeletionRegistry::parse(&String::from_utf8_lossy(&body))
            }
        };

        self.cached_registry = Some(registry.clone());
        Ok(registry)
    }

    /// Persist the registry and make it the cached copy.
    ///
    /// Protocol: PUT the new body (unlocked), then best-effort delete every
    /// other stored version at the registry key. Old versions that fail to
    /// delete are ignored; the next pass retries them.
    pub(crate) async fn persist_registry(
        &mut self,
        registry: DeletionRegistry,
    ) -> Result<(), EngineError> {
        let body = registry.serialize();
        let bytes = Bytes::from(body.into_bytes());

        let request = PutRequest {
            key: REGISTRY_KEY.to_owned(),
            content_length: bytes.len() as u64,
            crc32c: Some(crc32c_base64(&bytes)),
            content_sha256: Some(integrity::sha256_hex(&bytes)),
            retention: None,
        };
        let response = self
            .store
            .put_object(request, PutBody::Bytes(bytes))
            .await?;

        // Collapse history down to the version just written.
        let stored = self.store.list_all_object_versions(REGISTRY_KEY).await?;
        let stale: Vec<ObjectIdentifier> = stored
            .versions
            .iter()
            .filter(|version| {
                version.key == REGISTRY_KEY && version.version_id != response.version_id
            })
            .map(|version| ObjectIdentifier::versioned(&version.key, &version.version_id))
            .collect();

        if !stale.is_empty() {
            match self.store.delete_objects(stale).await {
                Ok(result) => {
                    for entry in &result.errors {
                        debug!(
                            key = %entry.key,
                            code = %entry.code,
                            "old registry version not yet deletable"
                        );
                    }
                }
                Err(err) => warn!(%err, "could not prune old registry versions"),
            }
        }

        self.cached_registry = Some(registry);
        self.invalidate_versions();
        Ok(())
    }
}

/// Drain a body stream into memory.
pub(crate) async fn collect_body(body: ByteStream) -> Result<Vec<u8>, EngineError> {
    let aggregated = body
        .collect()
        .await
        .map_err(|err| EngineError::Io(std::io::Error::other(err)))?;
    Ok(aggregated.to_vec())
}

/// Build the retention window used by backup uploads.
pub(crate) fn retention_from(clock: &dyn Clock, object_lock_hours: i64) -> Retention {
    Retention::compliance_until(clock.now() + Duration::hours(object_lock_hours))
}
