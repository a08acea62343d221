//! Shared request/response types for the object store contract.
//!
//! These are deliberately narrower than the full S3 data model: they carry
//! exactly the fields the archive engine consumes: keys, version ids,
//! retention, and the integrity metadata (`CRC32C` header, `pickle-sha256`
//! user metadata) that travels with every stored object.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};

pub use aws_smithy_types::byte_stream::ByteStream;

use crate::error::StoreError;

/// User-metadata key under which the SHA-256 of an object body is stored
/// (wire header `x-amz-meta-pickle-sha256`).
pub const SHA256_METADATA_KEY: &str = "pickle-sha256";

/// Base64-encoded CRC32C of a body, in the form the `x-amz-checksum-crc32c`
/// header carries.
#[must_use]
pub fn crc32c_base64(data: &[u8]) -> String {
    use base64::Engine;
    let sum = crc32c::crc32c(data);
    base64::engine::general_purpose::STANDARD.encode(sum.to_be_bytes())
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// Object lock retention mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionMode {
    /// Retention that privileged callers may bypass.
    Governance,
    /// Retention the service refuses to shorten or remove, even for the
    /// account owner.
    Compliance,
}

impl RetentionMode {
    /// Return the wire representation of the mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Governance => "GOVERNANCE",
            Self::Compliance => "COMPLIANCE",
        }
    }
}

impl fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetentionMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GOVERNANCE" => Ok(Self::Governance),
            "COMPLIANCE" => Ok(Self::Compliance),
            other => Err(StoreError::Decode {
                context: "retention mode",
                message: format!("unknown mode: {other}"),
            }),
        }
    }
}

/// An object lock retention period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// The lock mode.
    pub mode: RetentionMode,
    /// The instant until which the object may not be deleted.
    pub retain_until: DateTime<Utc>,
}

impl Retention {
    /// Build a COMPLIANCE retention lasting until the given instant.
    #[must_use]
    pub fn compliance_until(retain_until: DateTime<Utc>) -> Self {
        Self {
            mode: RetentionMode::Compliance,
            retain_until,
        }
    }
}

// ---------------------------------------------------------------------------
// Version listings
// ---------------------------------------------------------------------------

/// One stored object version in a version listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectVersionInfo {
    /// The object key.
    pub key: String,
    /// The version id assigned by the store.
    pub version_id: String,
    /// Whether this is the newest version for its key.
    pub is_latest: bool,
    /// When this version was written.
    pub last_modified: DateTime<Utc>,
    /// Body size in bytes.
    pub size: u64,
    /// Storage class, when the service reports one.
    pub storage_class: Option<String>,
}

/// A delete marker in a version listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMarkerInfo {
    /// The object key.
    pub key: String,
    /// The version id of the marker.
    pub version_id: String,
    /// Whether the marker is the newest version for its key.
    pub is_latest: bool,
}

/// A complete (fully paginated) version listing.
///
/// Versions arrive in the service's listing order: keys ascending, and
/// within a key newest version first.
#[derive(Debug, Clone, Default)]
pub struct VersionListing {
    /// All object versions.
    pub versions: Vec<ObjectVersionInfo>,
    /// All delete markers.
    pub delete_markers: Vec<DeleteMarkerInfo>,
}

impl VersionListing {
    /// Iterate versions oldest first (the authoritative-version order used
    /// by the archive engine and backup convergence).
    pub fn versions_oldest_first(&self) -> impl Iterator<Item = &ObjectVersionInfo> {
        self.versions.iter().rev()
    }
}

// ---------------------------------------------------------------------------
// Identifiers and metadata
// ---------------------------------------------------------------------------

/// Identifies one stored version for batch deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectIdentifier {
    /// The object key.
    pub key: String,
    /// The version id; `None` targets the latest version.
    pub version_id: Option<String>,
}

impl ObjectIdentifier {
    /// Identify a specific stored version.
    #[must_use]
    pub fn versioned(key: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: Some(version_id.into()),
        }
    }
}

/// Metadata returned by HEAD (and alongside GET bodies).
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    /// The object key.
    pub key: String,
    /// The resolved version id.
    pub version_id: String,
    /// Hex SHA-256 of the body, from the `pickle-sha256` user metadata.
    pub content_sha256: Option<String>,
    /// Base64 CRC32C of the body, when the service reports it.
    pub crc32c: Option<String>,
    /// Body size in bytes, when known.
    pub content_length: Option<u64>,
    /// Current object lock retention, if any.
    pub retention: Option<Retention>,
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

/// The body of a PUT request.
///
/// File and in-memory bodies can be replayed across retries; a streaming
/// body is consumed once and is therefore sent in a single attempt.
pub enum PutBody {
    /// Stream the contents of a local file.
    File(PathBuf),
    /// An in-memory body.
    Bytes(Bytes),
    /// A one-shot streaming body (used by [`crate::store::stream_copy`]).
    Stream(ByteStream),
}

impl fmt::Debug for PutBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A PUT request: key, length, integrity headers, and optional retention.
#[derive(Debug, Clone)]
pub struct PutRequest {
    /// Destination key.
    pub key: String,
    /// Exact body length in bytes.
    pub content_length: u64,
    /// Base64-encoded CRC32C of the body; the service recomputes and
    /// rejects mismatches.
    pub crc32c: Option<String>,
    /// Hex SHA-256 of the body, stored as `pickle-sha256` user metadata.
    pub content_sha256: Option<String>,
    /// Object lock retention to apply at creation.
    pub retention: Option<Retention>,
}

/// Response to a successful PUT.
#[derive(Debug, Clone)]
pub struct PutObjectResponse {
    /// The version id assigned to the stored object.
    pub version_id: String,
}

/// Response to a successful GET: streaming body plus response metadata.
pub struct GetObjectResponse {
    /// The object body.
    pub body: ByteStream,
    /// Metadata from the response headers.
    pub metadata: ObjectMetadata,
}

impl fmt::Debug for GetObjectResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetObjectResponse")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Batch delete results
// ---------------------------------------------------------------------------

/// Outcome of a batch delete: per-entry successes and failures.
#[derive(Debug, Clone, Default)]
pub struct DeleteResult {
    /// Entries the service removed.
    pub deleted: Vec<ObjectIdentifier>,
    /// Entries the service refused.
    pub errors: Vec<DeleteEntryError>,
}

/// A per-entry batch delete failure.
#[derive(Debug, Clone)]
pub struct DeleteEntryError {
    /// The key that failed.
    pub key: String,
    /// The version id that failed, if the entry named one.
    pub version_id: Option<String>,
    /// The service error code.
    pub code: String,
    /// The service error message.
    pub message: String,
}

impl DeleteEntryError {
    /// Whether this failure is an object lock refusal, an expected
    /// non-fatal signal that the version is still under retention.
    #[must_use]
    pub fn is_lock_violation(&self) -> bool {
        matches!(self.code.as_str(), "AccessDenied" | "ObjectLocked" | "InvalidRequest")
    }
}
