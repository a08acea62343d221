//! Listing semantics: oldest stored version wins, latest archive per path.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use pickle_store::{ObjectStore, PutBody, PutRequest, crc32c_base64};

    use crate::TestContext;

    /// Store an interfering extra version at an existing key.
    async fn inject_version(ctx: &TestContext, key: &str, body: &[u8]) -> String {
        let response = ctx
            .primary
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
            .expect("inject version");
        response.version_id
    }

    #[tokio::test]
    async fn test_should_list_oldest_version_and_download_original() {
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine
            .upload_file(&source, "here.txt")
            .await
            .expect("upload");

        let files = engine.list_files().await.expect("list files");
        let original = files[0].clone();

        // Overwrite the stored ciphertext at the same key. The archive id in
        // the key identifies one logical archive, so the newer stored
        // version is interference, not an update.
        inject_version(&ctx, &original.key, b"bad data").await;
        assert_eq!(ctx.primary.versions_of(&original.key).len(), 2);

        // Regenerate the engine after the external change.
        let mut engine = ctx.engine();
        let files = engine.list_files().await.expect("list files");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].version_id, original.version_id);

        // Download still yields the original plaintext.
        let target = ctx.target_path("out.txt");
        engine
            .download_file(&original.key, &target)
            .await
            .expect("download");
        assert_eq!(std::fs::read(&target).ok().as_deref(), Some(&b"abc"[..]));
    }

    #[tokio::test]
    async fn test_should_flag_latest_upload_per_path() {
        let ctx = TestContext::new();
        let first = ctx.write_file("one.txt", b"one");
        let second = ctx.write_file("two.txt", b"two");

        let mut engine = ctx.engine();
        engine
            .upload_file(&first, "same.txt")
            .await
            .expect("upload first");
        engine
            .upload_file(&second, "same.txt")
            .await
            .expect("upload second");

        let files = engine.list_files().await.expect("list files");
        assert_eq!(files.len(), 2);
        for entry in &files {
            assert_eq!(entry.path, "same.txt");
        }

        let latest: Vec<_> = files.iter().filter(|entry| entry.is_latest).collect();
        assert_eq!(latest.len(), 1);
        // Archive ids are K-sortable: the larger one is the newer upload.
        let max_id = files
            .iter()
            .map(|entry| entry.archive_id.clone())
            .max()
            .unwrap_or_default();
        assert_eq!(latest[0].archive_id, max_id);
    }

    #[tokio::test]
    async fn test_should_order_listings_by_stored_key() {
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        for path in ["b.txt", "a.txt", "folder/c.txt"] {
            engine.upload_file(&source, path).await.expect("upload");
        }

        let files = engine.list_files().await.expect("list files");
        let keys: Vec<&str> = files.iter().map(|entry| entry.key.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn test_should_sanitize_paths_into_keys() {
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine
            .upload_file(&source, "my report (final)  v2?.txt")
            .await
            .expect("upload");

        let files = engine.list_files().await.expect("list files");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "my_report_(final)_v2.txt");
    }
}
