//! The object store contract consumed by the archive engine.
//!
//! One concrete adapter ([`crate::s3::S3ObjectStore`]) talks to a real
//! S3-compatible service; [`crate::memory::MemoryStore`] backs the test
//! harness. Both sides of a backup are plain `&dyn ObjectStore`, so the
//! convergence code never knows which one it is driving.

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;
use crate::types::{
    DeleteResult, GetObjectResponse, ObjectIdentifier, ObjectMetadata, PutBody, PutObjectResponse,
    PutRequest, Retention, VersionListing,
};

/// A versioned, object-lock-aware blob store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Enumerate every object version and delete marker under `prefix`,
    /// fully paginated, in the service's listing order (keys ascending,
    /// newest version of a key first).
    async fn list_all_object_versions(&self, prefix: &str) -> Result<VersionListing, StoreError>;

    /// Store a body under a key, with integrity headers and optional
    /// retention applied at creation. Returns the assigned version id.
    async fn put_object(
        &self,
        request: PutRequest,
        body: PutBody,
    ) -> Result<PutObjectResponse, StoreError>;

    /// Fetch a body. `version_id` of `None` resolves the latest version.
    async fn get_object(
        &self,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<GetObjectResponse, StoreError>;

    /// Fetch metadata without the body.
    async fn head_object(
        &self,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectMetadata, StoreError>;

    /// Delete a batch of versions. Per-entry refusals (an object still under
    /// lock) are reported in the result, not as an `Err`.
    async fn delete_objects(
        &self,
        objects: Vec<ObjectIdentifier>,
    ) -> Result<DeleteResult, StoreError>;

    /// Extend the retention of one stored version. The service rejects
    /// dates earlier than the stored one.
    async fn put_object_retention(
        &self,
        key: &str,
        version_id: &str,
        retention: &Retention,
    ) -> Result<(), StoreError>;
}

impl std::fmt::Debug for dyn ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ObjectStore")
    }
}

/// Copy one stored version from `source` to `target` in a single streaming
/// pass: the GET body is piped straight into the PUT, carrying the source's
/// CRC32C, content length, and SHA-256 metadata, with the given retention
/// applied on the target. Nothing is spilled to disk.
pub async fn stream_copy(
    source: &dyn ObjectStore,
    target: &dyn ObjectStore,
    key: &str,
    version_id: &str,
    retention: &Retention,
) -> Result<(), StoreError> {
    let response = source.get_object(key, Some(version_id)).await?;
    let metadata = response.metadata;

    let content_length =
        metadata
            .content_length
            .ok_or_else(|| StoreError::MissingMetadata {
                name: "content-length",
                key: key.to_owned(),
            })?;

    debug!(key, version_id, content_length, "streaming object copy");

    let request = PutRequest {
        key: key.to_owned(),
        content_length,
        crc32c: metadata.crc32c,
        content_sha256: metadata.content_sha256,
        retention: Some(*retention),
    };

    target
        .put_object(request, PutBody::Stream(response.body))
        .await?;
    Ok(())
}
