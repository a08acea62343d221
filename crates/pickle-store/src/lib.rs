//! Object store adapters for the pickle archive engine.
//!
//! The engine consumes a narrow contract over a versioned, object-lock-aware
//! blob store: list-versions, put (with retention and integrity metadata),
//! get, head, batched delete, put-retention, and a single-pass stream copy
//! between two stores.
//!
//! # Architecture
//!
//! ```text
//! pickle-engine (archive lifecycle)
//!        |
//!        v
//!   ObjectStore trait  ──  stream_copy
//!      /        \
//!     v          v
//! S3ObjectStore  MemoryStore
//! (aws-sdk-s3)   (test harness)
//! ```
//!
//! Every `S3ObjectStore` call runs inside [`retry::with_retries`]: network
//! failures and 5xx responses back off exponentially (10 attempts, 100 ms
//! base, ≤100 ms jitter); 4xx responses and decode failures are fatal to the
//! call.

pub mod clock;
pub mod error;
pub mod memory;
pub mod retry;
pub mod s3;
pub mod store;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use retry::RetryPolicy;
pub use s3::{S3Config, S3ObjectStore};
pub use store::{ObjectStore, stream_copy};
pub use types::{
    ByteStream, DeleteEntryError, DeleteMarkerInfo, DeleteResult, GetObjectResponse,
    ObjectIdentifier, ObjectMetadata, ObjectVersionInfo, PutBody, PutObjectResponse, PutRequest,
    Retention, RetentionMode, SHA256_METADATA_KEY, VersionListing, crc32c_base64,
};
