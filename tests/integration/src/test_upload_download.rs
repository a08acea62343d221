//! Upload/download round trips and ciphertext verification.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use pickle_engine::naming;
    use pickle_store::{ObjectIdentifier, ObjectStore, PutBody, PutRequest, crc32c_base64};

    use crate::{TestContext, single_version};

    #[tokio::test]
    async fn test_should_upload_and_download() {
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine
            .upload_file(&source, "here.txt")
            .await
            .expect("upload");

        let files = engine.list_files().await.expect("list files");
        assert_eq!(files.len(), 1);
        let upload = &files[0];
        assert_eq!(upload.path, "here.txt");
        assert!(upload.is_latest);

        let target = ctx.target_path("out.txt");
        engine
            .download_file(&upload.key, &target)
            .await
            .expect("download");

        assert_eq!(std::fs::read(&target).ok().as_deref(), Some(&b"abc"[..]));
    }

    #[tokio::test]
    async fn test_should_upload_and_download_with_nested_paths() {
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine
            .upload_file(&source, "in-folder/here.txt")
            .await
            .expect("upload");

        let files = engine.list_files().await.expect("list files");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "in-folder/here.txt");

        let target = ctx.target_path("out.txt");
        engine
            .download_file(&files[0].key, &target)
            .await
            .expect("download");
        assert_eq!(std::fs::read(&target).ok().as_deref(), Some(&b"abc"[..]));
    }

    #[tokio::test]
    async fn test_should_store_ciphertext_with_checksum_sidecar() {
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine
            .upload_file(&source, "here.txt")
            .await
            .expect("upload");

        let files = engine.list_files().await.expect("list files");
        let data = single_version(&ctx.primary, &files[0].key);

        // The stored body is sealed, not the plaintext.
        assert_ne!(data.content.as_ref(), b"abc");

        // The sidecar holds the hex SHA-256 of the ciphertext at rest.
        let sidecar = single_version(&ctx.primary, &naming::checksum_key(&files[0].key));
        assert_eq!(sidecar.content.len(), 64);
        assert_eq!(
            String::from_utf8_lossy(&sidecar.content),
            pickle_engine::integrity::sha256_hex(&data.content)
        );
    }

    #[tokio::test]
    async fn test_should_fail_download_when_ciphertext_corrupted() {
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine
            .upload_file(&source, "here.txt")
            .await
            .expect("upload");

        let files = engine.list_files().await.expect("list files");
        let upload = &files[0];

        // Mess with the stored bits.
        ctx.primary
            .corrupt_version(&upload.version_id, vec![1, 2, 3, 4]);

        let target = ctx.target_path("out.txt");
        let err = engine
            .download_file(&upload.key, &target)
            .await
            .expect_err("download must fail");
        assert!(err.to_string().contains("checksums do not match."));
    }

    #[tokio::test]
    async fn test_should_verify_against_oldest_sidecar_version() {
        // An interfering newer version at the checksum key must not defeat
        // verification: the oldest version is the authoritative one, same
        // as for data keys.
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine
            .upload_file(&source, "here.txt")
            .await
            .expect("upload");

        let files = engine.list_files().await.expect("list files");
        let sidecar_key = naming::checksum_key(&files[0].key);
        let bogus = b"0000000000000000000000000000000000000000000000000000000000000000";
        ctx.primary
            .put_object(
                PutRequest {
                    key: sidecar_key.clone(),
                    content_length: bogus.len() as u64,
                    crc32c: Some(crc32c_base64(bogus)),
                    content_sha256: None,
                    retention: None,
                },
                PutBody::Bytes(Bytes::from_static(bogus)),
            )
            .await
            .expect("inject sidecar duplicate");
        assert_eq!(ctx.primary.versions_of(&sidecar_key).len(), 2);

        // Regenerate the engine after the external change.
        let mut engine = ctx.engine();
        let target = ctx.target_path("out.txt");
        engine
            .download_file(&files[0].key, &target)
            .await
            .expect("download");
        assert_eq!(std::fs::read(&target).ok().as_deref(), Some(&b"abc"[..]));
    }

    #[tokio::test]
    async fn test_should_download_without_sidecar() {
        // Archives written before sidecars existed still download; the
        // verification step is skipped, not failed.
        let ctx = TestContext::new();
        let source = ctx.write_file("file.txt", b"abc");

        let mut engine = ctx.engine();
        engine
            .upload_file(&source, "here.txt")
            .await
            .expect("upload");

        let files = engine.list_files().await.expect("list files");
        let sidecar_key = naming::checksum_key(&files[0].key);
        let sidecar = single_version(&ctx.primary, &sidecar_key);
        let removed = ctx
            .primary
            .delete_objects(vec![ObjectIdentifier::versioned(
                &sidecar_key,
                &sidecar.version_id,
            )])
            .await
            .expect("delete sidecar");
        assert!(removed.errors.is_empty());

        let target = ctx.target_path("out.txt");
        engine
            .download_file(&files[0].key, &target)
            .await
            .expect("download");
        assert_eq!(std::fs::read(&target).ok().as_deref(), Some(&b"abc"[..]));
    }
}
