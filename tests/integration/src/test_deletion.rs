//! Soft delete, restore, and the deletion registry object.

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pickle_engine::naming::{REGISTRY_KEY, checksum_key};

    use crate::{TestContext, scenario_start, single_version};

    #[tokio::test]
    async fn test_should_delete_and_restore_file() {
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine
            .upload_file(&source, "here.txt")
            .await
            .expect("upload");

        let files = engine.list_files().await.expect("list files");
        assert_eq!(files.len(), 1);
        let upload = files[0].clone();

        engine.delete_file(&upload.key).await.expect("delete");

        // The file is no longer listed.
        let files = engine.list_files().await.expect("list files");
        assert!(files.is_empty());

        // But it is in the trash bin.
        let trash = engine.list_trash().await.expect("list trash");
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].key, upload.key);

        engine.restore_file(&upload.key).await.expect("restore");

        // Not in the trash bin anymore.
        let trash = engine.list_trash().await.expect("list trash");
        assert!(trash.is_empty());

        // Back in the main list.
        let files = engine.list_files().await.expect("list files");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].key, upload.key);
    }

    #[tokio::test]
    async fn test_should_extend_retention_on_restore() {
        let mut ctx = TestContext::new();
        ctx.object_lock_hours = 5;
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine
            .upload_file(&source, "here.txt")
            .await
            .expect("upload");
        let files = engine.list_files().await.expect("list files");
        let upload = files[0].clone();

        ctx.advance(Duration::hours(1));
        engine.delete_file(&upload.key).await.expect("delete");

        // Restore late in the lock window; without the extension the file
        // would be reclaimable almost immediately.
        ctx.advance(Duration::hours(3));
        engine.restore_file(&upload.key).await.expect("restore");

        let expected_until = scenario_start() + Duration::hours(4 + 5);
        let data = single_version(&ctx.primary, &upload.key);
        assert_eq!(
            data.retention.map(|r| r.retain_until),
            Some(expected_until)
        );
        let sidecar = single_version(&ctx.primary, &checksum_key(&upload.key));
        assert_eq!(
            sidecar.retention.map(|r| r.retain_until),
            Some(expected_until)
        );
    }

    #[tokio::test]
    async fn test_should_keep_single_registry_version() {
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine.upload_file(&source, "a.txt").await.expect("upload");
        engine.upload_file(&source, "b.txt").await.expect("upload");

        let files = engine.list_files().await.expect("list files");
        assert_eq!(files.len(), 2);

        // Every registry write collapses history down to the new version.
        engine.delete_file(&files[0].key).await.expect("delete a");
        engine.delete_file(&files[1].key).await.expect("delete b");

        let registry_versions = ctx.primary.versions_of(REGISTRY_KEY);
        assert_eq!(registry_versions.len(), 1);
        assert!(!registry_versions[0].content.is_empty());

        let trash = engine.list_trash().await.expect("list trash");
        assert_eq!(trash.len(), 2);
    }

    #[tokio::test]
    async fn test_should_serialize_registry_as_encoded_lines() {
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine
            .upload_file(&source, "docs/x.txt")
            .await
            .expect("upload");
        let files = engine.list_files().await.expect("list files");
        engine.delete_file(&files[0].key).await.expect("delete");

        let registry = single_version(&ctx.primary, REGISTRY_KEY);
        let body = String::from_utf8_lossy(&registry.content).into_owned();
        // Keys are stored base64url-encoded, never raw.
        assert!(!body.contains("docs/x.txt"));

        let parsed = pickle_engine::DeletionRegistry::parse(&body);
        assert!(parsed.contains(&files[0].key));
    }
}
