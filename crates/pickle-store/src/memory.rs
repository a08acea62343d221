//! In-memory object store for the test harness.
//!
//! [`MemoryStore`] models the slice of S3 the archive engine depends on:
//! versioned keys (newest version first), COMPLIANCE object lock that
//! refuses deletes and retention rollbacks, CRC32C validation on PUT, and
//! the `pickle-sha256` user metadata. The clock is injected so retention
//! timelines can be driven from tests.
//!
//! Cloning a `MemoryStore` shares the underlying bucket, which is how tests
//! hand "the same bucket" to several engine instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::ObjectStore;
use crate::types::{
    ByteStream, DeleteEntryError, DeleteResult, GetObjectResponse, ObjectIdentifier,
    ObjectMetadata, ObjectVersionInfo, PutBody, PutObjectResponse, PutRequest, Retention,
    VersionListing, crc32c_base64,
};

/// One stored version, exposed to tests for direct inspection.
#[derive(Debug, Clone)]
pub struct StoredVersion {
    /// The object key.
    pub key: String,
    /// The assigned version id.
    pub version_id: String,
    /// The stored body.
    pub content: Bytes,
    /// The `pickle-sha256` user metadata, if the writer supplied it.
    pub content_sha256: Option<String>,
    /// The base64 CRC32C recorded at write time.
    pub crc32c: Option<String>,
    /// When the version was written.
    pub last_modified: DateTime<Utc>,
    /// The current object lock retention.
    pub retention: Option<Retention>,
}

#[derive(Debug)]
struct Inner {
    // Key to versions, newest first.
    objects: Mutex<BTreeMap<String, Vec<StoredVersion>>>,
    clock: Arc<dyn Clock>,
}

/// An in-memory, versioned, object-lock-enforcing store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                objects: Mutex::new(BTreeMap::new()),
                clock,
            }),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    // -- test accessors ----------------------------------------------------

    /// All stored versions for a key, oldest first. Empty if the key is
    /// absent.
    #[must_use]
    pub fn versions_of(&self, key: &str) -> Vec<StoredVersion> {
        self.inner
            .objects
            .lock()
            .get(key)
            .map(|versions| versions.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up a stored version anywhere in the bucket by version id.
    #[must_use]
    pub fn find_version(&self, version_id: &str) -> Option<StoredVersion> {
        self.inner
            .objects
            .lock()
            .values()
            .flatten()
            .find(|version| version.version_id == version_id)
            .cloned()
    }

    /// Overwrite the stored bytes of a version in place, without touching
    /// its recorded checksums. Simulates at-rest corruption.
    pub fn corrupt_version(&self, version_id: &str, content: impl Into<Bytes>) {
        let content = content.into();
        let mut objects = self.inner.objects.lock();
        for versions in objects.values_mut() {
            if let Some(version) = versions
                .iter_mut()
                .find(|version| version.version_id == version_id)
            {
                version.content = content.clone();
                return;
            }
        }
    }

    fn metadata_of(version: &StoredVersion) -> ObjectMetadata {
        ObjectMetadata {
            key: version.key.clone(),
            version_id: version.version_id.clone(),
            content_sha256: version.content_sha256.clone(),
            crc32c: version.crc32c.clone(),
            content_length: Some(version.content.len() as u64),
            retention: version.retention,
        }
    }

    fn resolve(
        &self,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<StoredVersion, StoreError> {
        let objects = self.inner.objects.lock();
        let versions = objects.get(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_owned(),
        })?;
        let version = match version_id {
            Some(id) => versions.iter().find(|version| version.version_id == id),
            None => versions.first(),
        };
        version.cloned().ok_or_else(|| StoreError::NotFound {
            key: key.to_owned(),
        })
    }
}

async fn read_body(body: PutBody) -> Result<Bytes, StoreError> {
    match body {
        PutBody::Bytes(bytes) => Ok(bytes),
        PutBody::File(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
        PutBody::Stream(stream) => Ok(stream
            .collect()
            .await
            .map_err(|err| StoreError::BodyIo(std::io::Error::other(err)))?
            .into_bytes()),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_all_object_versions(&self, prefix: &str) -> Result<VersionListing, StoreError> {
        let objects = self.inner.objects.lock();
        let mut listing = VersionListing::default();
        for (key, versions) in objects.iter() {
            if !prefix.is_empty() && !key.starts_with(prefix) {
                continue;
            }
            for (idx, version) in versions.iter().enumerate() {
                listing.versions.push(ObjectVersionInfo {
                    key: version.key.clone(),
                    version_id: version.version_id.clone(),
                    is_latest: idx == 0,
                    last_modified: version.last_modified,
                    size: version.content.len() as u64,
                    storage_class: None,
                });
            }
        }
        Ok(listing)
    }

    async fn put_object(
        &self,
        request: PutRequest,
        body: PutBody,
    ) -> Result<PutObjectResponse, StoreError> {
        let content = read_body(body).await?;

        if content.len() as u64 != request.content_length {
            return Err(StoreError::Service {
                operation: "PutObject",
                status: 400,
                message: format!(
                    "IncompleteBody: declared {} bytes, received {}",
                    request.content_length,
                    content.len()
                ),
            });
        }
        if let Some(expected) = &request.crc32c {
            let actual = crc32c_base64(&content);
            if *expected != actual {
                return Err(StoreError::Service {
                    operation: "PutObject",
                    status: 400,
                    message: "BadDigest: crc32c checksum does not match body".to_owned(),
                });
            }
        }

        let version = StoredVersion {
            key: request.key.clone(),
            version_id: Uuid::new_v4().to_string(),
            content,
            content_sha256: request.content_sha256,
            crc32c: request.crc32c,
            last_modified: self.now(),
            retention: request.retention,
        };
        let version_id = version.version_id.clone();
        debug!(key = %request.key, version_id = %version_id, "stored object version");

        self.inner
            .objects
            .lock()
            .entry(request.key)
            .or_default()
            .insert(0, version);

        Ok(PutObjectResponse { version_id })
    }

    async fn get_object(
        &self,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<GetObjectResponse, StoreError> {
        let version = self.resolve(key, version_id)?;
        let metadata = Self::metadata_of(&version);
        let body = ByteStream::from(version.content);
        Ok(GetObjectResponse { body, metadata })
    }

    async fn head_object(
        &self,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectMetadata, StoreError> {
        let version = self.resolve(key, version_id)?;
        Ok(Self::metadata_of(&version))
    }

    async fn delete_objects(
        &self,
        objects: Vec<ObjectIdentifier>,
    ) -> Result<DeleteResult, StoreError> {
        let now = self.now();
        let mut store = self.inner.objects.lock();
        let mut result = DeleteResult::default();

        for object in objects {
            let Some(versions) = store.get_mut(&object.key) else {
                // Deleting a missing object succeeds, per S3 semantics.
                result.deleted.push(object);
                continue;
            };
            let idx = match &object.version_id {
                Some(id) => versions.iter().position(|v| v.version_id == *id),
                None => (!versions.is_empty()).then_some(0),
            };
            let Some(idx) = idx else {
                result.deleted.push(object);
                continue;
            };

            let locked = versions[idx]
                .retention
                .is_some_and(|retention| retention.retain_until > now);
            if locked {
                result.errors.push(DeleteEntryError {
                    key: object.key.clone(),
                    version_id: object.version_id.clone(),
                    code: "AccessDenied".to_owned(),
                    message: "object is protected by COMPLIANCE mode retention".to_owned(),
                });
                continue;
            }

            versions.remove(idx);
            if versions.is_empty() {
                store.remove(&object.key);
            }
            result.deleted.push(object);
        }

        Ok(result)
    }

    async fn put_object_retention(
        &self,
        key: &str,
        version_id: &str,
        retention: &Retention,
    ) -> Result<(), StoreError> {
        let mut objects = self.inner.objects.lock();
        let version = objects
            .get_mut(key)
            .and_then(|versions| {
                versions
                    .iter_mut()
                    .find(|version| version.version_id == version_id)
            })
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_owned(),
            })?;

        // Retention may only be extended, never shortened.
        if let Some(existing) = &version.retention {
            if retention.retain_until < existing.retain_until {
                return Err(StoreError::Service {
                    operation: "PutObjectRetention",
                    status: 400,
                    message: "InvalidRequest: proposed retain-until date is earlier than the existing date"
                        .to_owned(),
                });
            }
        }
        version.retention = Some(*retention);
        Ok(())
    }
}
