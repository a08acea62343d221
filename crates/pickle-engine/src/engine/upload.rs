//! Archive upload: encrypt, checksum, store with retention.

use std::path::Path;

use bytes::Bytes;
use tokio::task;
use tracing::info;

use pickle_store::{PutBody, PutRequest, crc32c_base64};

use super::Engine;
use crate::codec;
use crate::error::EngineError;
use crate::integrity;
use crate::naming::{self, ArchiveId};

impl Engine {
    /// Encrypt the file at `source` and store it under `target_path`.
    ///
    /// The ciphertext and its checksum sidecar are written as two objects
    /// with identical initial retention. The pair is not transactional: a
    /// failure between the two PUTs leaves an orphan that the next
    /// maintenance pass reaps.
    pub async fn upload_file(
        &mut self,
        source: &Path,
        target_path: &str,
    ) -> Result<(), EngineError> {
        let working = tempfile::tempdir()?;
        let archive_path = working.path().join("archive.age");

        // Seal the plaintext into the working directory.
        let recipient = self.recipient.clone();
        let plaintext_path = source.to_owned();
        let ciphertext_path = archive_path.clone();
        task::spawn_blocking(move || -> Result<(), EngineError> {
            let mut input = std::fs::File::open(&plaintext_path)?;
            let output = std::fs::File::create(&ciphertext_path)?;
            codec::encrypt_stream(&mut input, output, &recipient)
        })
        .await??;

        let content_length = tokio::fs::metadata(&archive_path).await?.len();

        // Digest the ciphertext at rest.
        let digest_path = archive_path.clone();
        let (sha256_hex, crc32c) =
            task::spawn_blocking(move || -> Result<(String, String), EngineError> {
                Ok((
                    integrity::sha256_hex_of_file(&digest_path)?,
                    integrity::crc32c_base64_of_file(&digest_path)?,
                ))
            })
            .await??;

        let id = ArchiveId::generate();
        let key = naming::data_key(&naming::sanitize_path(target_path), &id);
        let retention = self.lock_retention();

        self.store
            .put_object(
                PutRequest {
                    key: key.clone(),
                    content_length,
                    crc32c: Some(crc32c),
                    content_sha256: Some(sha256_hex.clone()),
                    retention: Some(retention),
                },
                PutBody::File(archive_path),
            )
            .await?;

        // The sidecar body is the hex digest itself.
        let sidecar_body = Bytes::from(sha256_hex.into_bytes());
        self.store
            .put_object(
                PutRequest {
                    key: naming::checksum_key(&key),
                    content_length: sidecar_body.len() as u64,
                    crc32c: Some(crc32c_base64(&sidecar_body)),
                    content_sha256: Some(integrity::sha256_hex(&sidecar_body)),
                    retention: Some(retention),
                },
                PutBody::Bytes(sidecar_body),
            )
            .await?;

        self.invalidate_versions();
        info!(key, size = content_length, "uploaded archive");
        Ok(())
    }
}
