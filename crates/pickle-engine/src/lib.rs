//! The pickle archive lifecycle engine.
//!
//! An encrypted, immutable-by-default archival store layered on a versioned,
//! object-lock-aware blob store. Each deposited file becomes an age-sealed
//! data object plus a SHA-256 checksum sidecar, both created under
//! COMPLIANCE retention. Deletion is a soft mark in a registry object;
//! physical reclamation happens in a periodic maintenance pass once the
//! retention lock has lapsed, and a convergent backup pass can mirror the
//! logical archive set into a second bucket.
//!
//! # Architecture
//!
//! ```text
//! Engine (upload / download / delete / restore / list / maintain)
//!   ├─ naming      key construction, archive ids
//!   ├─ codec       age recipient encryption
//!   ├─ integrity   ciphertext SHA-256, sidecar verification
//!   ├─ registry    soft-delete registry object
//!   └─ ObjectStore (pickle-store)
//! backup::run_backup (two ObjectStores)
//! scheduler::MaintenanceScheduler (background passes)
//! ```
//!
//! One engine instance drives one bucket, single-writer. Engines are cheap
//! to construct; a new workflow gets a new engine, which is also how the
//! in-process caches are invalidated.

pub mod backup;
pub mod codec;
mod engine;
pub mod error;
pub mod integrity;
pub mod naming;
pub mod registry;
pub mod scheduler;

pub use backup::run_backup;
pub use engine::{ArchiveEntry, Engine, EngineConfig};
pub use error::{EngineError, ErrorList};
pub use registry::DeletionRegistry;
pub use scheduler::{MaintenanceEvent, MaintenanceScheduler};
