//! Cross-bucket backup convergence.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::Duration;
    use pickle_engine::naming::{REGISTRY_KEY, checksum_key};
    use pickle_store::{MemoryStore, ObjectStore, PutBody, PutRequest, crc32c_base64};

    use crate::{TestContext, scenario_start, single_version};

    async fn inject_object(store: &MemoryStore, key: &str, body: &[u8]) -> String {
        let response = store
            .put_object(
                PutRequest {
                    key: key.to_owned(),
                    content_length: body.len() as u64,
                    crc32c: Some(crc32c_base64(body)),
                    content_sha256: None,
                    retention: None,
                },
                PutBody::Bytes(Bytes::copy_from_slice(body)),
            )
            .await
            .expect("inject object");
        response.version_id
    }

    /// Assert the authoritative version of `key` is identical on both sides.
    fn assert_synced(ctx: &TestContext, key: &str) {
        let src = single_version(&ctx.primary, key);
        let dst = single_version(&ctx.backup, key);
        assert_eq!(src.content, dst.content, "content differs for {key}");
        assert_eq!(src.crc32c, dst.crc32c, "checksum differs for {key}");
        assert_eq!(
            src.content_sha256, dst.content_sha256,
            "sha256 metadata differs for {key}"
        );
    }

    #[tokio::test]
    async fn test_should_converge_backup_bucket() {
        let mut ctx = TestContext::new();
        ctx.object_lock_hours = 3;
        let source = ctx.write_file("file.txt", b"abc");

        // --- Midnight: set up files on the primary ---
        let mut engine = ctx.engine();
        for path in ["deleted/a.txt", "active.txt", "active-b.txt"] {
            engine.upload_file(&source, path).await.expect("upload");
        }

        // Listings are ordered by stored key.
        let files = engine.list_files().await.expect("list files");
        assert_eq!(files.len(), 3);
        let file_active_b = files[0].clone();
        let file_active = files[1].clone();
        let file_deleted_a = files[2].clone();
        assert!(file_active.key.contains("active.txt"));
        assert!(file_active_b.key.contains("active-b.txt"));
        assert!(file_deleted_a.key.contains("deleted/a.txt"));

        // --- 1 AM: mark one file deleted, drop a stray object on the target ---
        ctx.advance(Duration::hours(1));
        engine
            .delete_file(&file_deleted_a.key)
            .await
            .expect("delete");
        inject_object(&ctx.backup, "random-file.txt", b"bad data").await;
        assert_eq!(ctx.backup.versions_of("random-file.txt").len(), 1);

        // --- 2 AM: first backup run ---
        ctx.advance(Duration::hours(1));
        ctx.run_backup().await.expect("backup");

        // The archive family is replicated, including the still-locked
        // soft-deleted file.
        for key in [
            &file_active.key,
            &file_active_b.key,
            &file_deleted_a.key,
        ] {
            assert_synced(&ctx, key);
            assert_synced(&ctx, &checksum_key(key));
        }
        // New copies are locked a full window from the backup run.
        let copy_until = scenario_start() + Duration::hours(2 + 3);
        let copied = single_version(&ctx.backup, &file_active.key);
        assert_eq!(copied.retention.map(|r| r.retain_until), Some(copy_until));
        // The stray object is gone.
        assert!(ctx.backup.versions_of("random-file.txt").is_empty());
        // The registry object is not part of the replicated set.
        assert!(ctx.backup.versions_of(REGISTRY_KEY).is_empty());

        // --- More setup: extend locks on the primary, inject a duplicate ---
        let mut engine = ctx.engine();
        engine.run_maintenance().await.expect("maintenance");
        let id_duplicate = inject_object(&ctx.backup, &file_active.key, b"bad data").await;
        assert_eq!(ctx.backup.versions_of(&file_active.key).len(), 2);
        let id_original = ctx.backup.versions_of(&file_active.key)[0]
            .version_id
            .clone();

        // --- 3 AM: second backup run prunes the duplicate ---
        ctx.advance(Duration::hours(1));
        ctx.run_backup().await.expect("backup");

        assert!(ctx.backup.find_version(&id_original).is_some());
        assert!(ctx.backup.find_version(&id_duplicate).is_none());
        // The soft-deleted file still exists on both sides.
        assert_eq!(ctx.backup.versions_of(&file_deleted_a.key).len(), 1);

        // --- 5 AM: the primary reclaims the deleted file; backup follows ---
        ctx.advance(Duration::hours(2));
        let mut engine = ctx.engine();
        engine.run_maintenance().await.expect("maintenance");
        assert!(ctx.primary.versions_of(&file_deleted_a.key).is_empty());

        ctx.run_backup().await.expect("backup");
        assert!(ctx.backup.versions_of(&file_deleted_a.key).is_empty());
        assert!(
            ctx.backup
                .versions_of(&checksum_key(&file_deleted_a.key))
                .is_empty()
        );

        // Lock extensions propagated: the primary's maintenance pushed its
        // retention to 8 AM, so the backup now retains at least as long.
        let src_until = single_version(&ctx.primary, &file_active.key)
            .retention
            .map(|r| r.retain_until);
        let dst_until = single_version(&ctx.backup, &file_active.key)
            .retention
            .map(|r| r.retain_until);
        assert_eq!(src_until, Some(scenario_start() + Duration::hours(8)));
        assert_eq!(dst_until, src_until);
    }

    #[tokio::test]
    async fn test_should_be_idempotent_with_unchanged_source() {
        let mut ctx = TestContext::new();
        ctx.object_lock_hours = 3;
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine.upload_file(&source, "a.txt").await.expect("upload");
        engine.upload_file(&source, "b.txt").await.expect("upload");
        let files = engine.list_files().await.expect("list files");

        ctx.advance(Duration::hours(1));
        ctx.run_backup().await.expect("backup");

        let snapshot: Vec<_> = files
            .iter()
            .map(|entry| single_version(&ctx.backup, &entry.key))
            .collect();

        // A second run with an unchanged source changes nothing.
        ctx.run_backup().await.expect("backup");
        for (entry, before) in files.iter().zip(&snapshot) {
            let after = single_version(&ctx.backup, &entry.key);
            assert_eq!(after.version_id, before.version_id);
            assert_eq!(
                after.retention.map(|r| r.retain_until),
                before.retention.map(|r| r.retain_until)
            );
        }
    }

    #[tokio::test]
    async fn test_should_never_shorten_target_retention() {
        // The target may already retain longer than the source; backup
        // leaves it alone.
        let mut ctx = TestContext::new();
        ctx.object_lock_hours = 1;
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine.upload_file(&source, "a.txt").await.expect("upload");
        let files = engine.list_files().await.expect("list files");
        let key = files[0].key.clone();

        ctx.run_backup().await.expect("backup");
        let first_until = single_version(&ctx.backup, &key)
            .retention
            .map(|r| r.retain_until);
        assert_eq!(first_until, Some(scenario_start() + Duration::hours(1)));

        // Source lock expires and is not renewed; the target keeps its own.
        ctx.advance(Duration::hours(2));
        ctx.run_backup().await.expect("backup");
        assert_eq!(
            single_version(&ctx.backup, &key)
                .retention
                .map(|r| r.retain_until),
            first_until
        );
    }
}
