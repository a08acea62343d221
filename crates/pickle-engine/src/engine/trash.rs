//! Soft delete and restore.

use tracing::info;

use super::Engine;
use crate::error::EngineError;
use crate::naming;

impl Engine {
    /// Mark the archive at `key` deleted.
    ///
    /// Only the registry changes; the stored objects remain under their
    /// retention lock and are physically removed by a later maintenance
    /// pass, once the lock has lapsed.
    pub async fn delete_file(&mut self, key: &str) -> Result<(), EngineError> {
        let mut registry = self.registry().await?;
        registry.insert(key);
        self.persist_registry(registry).await?;
        info!(key, "marked archive deleted");
        Ok(())
    }

    /// Unmark the archive at `key` and re-extend its retention.
    ///
    /// Without the extension, an archive restored late in its lock window
    /// would become eligible for reclamation almost immediately.
    pub async fn restore_file(&mut self, key: &str) -> Result<(), EngineError> {
        let mut registry = self.registry().await?;
        registry.remove(key);
        self.persist_registry(registry).await?;

        let retention = self.lock_retention();
        let version_id = self.resolve_stored_version(key).await?;
        self.store
            .put_object_retention(key, &version_id, &retention)
            .await?;

        let sidecar_key = naming::checksum_key(key);
        if let Ok(sidecar_version) = self.resolve_stored_version(&sidecar_key).await {
            self.store
                .put_object_retention(&sidecar_key, &sidecar_version, &retention)
                .await?;
        }

        info!(key, "restored archive");
        Ok(())
    }
}
