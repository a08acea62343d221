//! End-to-end scenario tests for the pickle archive engine.
//!
//! Every test runs against in-memory buckets ([`pickle_store::MemoryStore`])
//! with a manually driven clock, so retention timelines are exact and the
//! suite never sleeps or talks to a network.

use std::path::PathBuf;
use std::sync::{Arc, Once};

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use age::x25519::Identity;
use pickle_engine::{Engine, EngineConfig};
use pickle_store::{Clock, FixedClock, MemoryStore, ObjectStore};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// The instant most scenarios start at: 2025-06-20 00:00 UTC.
#[must_use]
pub fn scenario_start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-20T00:00:00Z")
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Shared fixture: two buckets, one clock, one identity.
pub struct TestContext {
    /// The manually driven clock shared by both buckets and every engine.
    pub clock: Arc<FixedClock>,
    /// The primary bucket.
    pub primary: MemoryStore,
    /// The backup bucket.
    pub backup: MemoryStore,
    /// The age identity archives are sealed for.
    pub identity: Identity,
    /// Retention window handed to engines and backup passes.
    pub object_lock_hours: i64,
    /// Scratch space for plaintext and download targets.
    pub working_dir: TempDir,
}

impl TestContext {
    /// A fresh context starting at [`scenario_start`] with no lock window.
    #[must_use]
    pub fn new() -> Self {
        init_tracing();
        let clock = Arc::new(FixedClock::new(scenario_start()));
        Self {
            primary: MemoryStore::new(clock.clone()),
            backup: MemoryStore::new(clock.clone()),
            identity: Identity::generate(),
            object_lock_hours: 0,
            working_dir: TempDir::new().unwrap_or_else(|_| panic!("create working dir")),
            clock,
        }
    }

    /// A fresh engine over the primary bucket. Engines are created per
    /// workflow; a new one also means fresh caches.
    #[must_use]
    pub fn engine(&self) -> Engine {
        let store: Arc<dyn ObjectStore> = Arc::new(self.primary.clone());
        let clock: Arc<dyn Clock> = self.clock.clone();
        Engine::new(EngineConfig {
            store: Some(store),
            identity: Some(self.identity.clone()),
            object_lock_hours: self.object_lock_hours,
            clock: Some(clock),
        })
        .unwrap_or_else(|_| panic!("engine config is complete"))
    }

    /// Advance the shared clock.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Run one backup pass from the primary bucket to the backup bucket.
    pub async fn run_backup(&self) -> Result<(), pickle_engine::EngineError> {
        pickle_engine::run_backup(
            &self.primary,
            &self.backup,
            self.object_lock_hours,
            self.clock.as_ref(),
        )
        .await
    }

    /// Write a plaintext file into the working directory.
    #[must_use]
    pub fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.working_dir.path().join(name);
        let written = std::fs::write(&path, contents);
        assert!(written.is_ok(), "write {name}");
        path
    }

    /// Path for a download target inside the working directory.
    #[must_use]
    pub fn target_path(&self, name: &str) -> PathBuf {
        self.working_dir.path().join(name)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert that exactly one version exists at `key` in `store` and return it.
#[must_use]
pub fn single_version(store: &MemoryStore, key: &str) -> pickle_store::memory::StoredVersion {
    let versions = store.versions_of(key);
    assert_eq!(versions.len(), 1, "expected exactly one version at {key}");
    versions
        .into_iter()
        .next()
        .unwrap_or_else(|| unreachable!("length checked above"))
}

mod test_backup;
mod test_deletion;
mod test_listing;
mod test_upload_download;
