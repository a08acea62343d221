//! Archive download: fetch, verify, decrypt.

use std::path::Path;

use tokio::io::AsyncWriteExt;
use tokio::task;
use tracing::{info, warn};

use super::{Engine, collect_body};
use crate::codec;
use crate::error::EngineError;
use crate::integrity::{self, StreamingDigest};
use crate::naming;

impl Engine {
    /// Download the archive stored at `key`, decrypting to `target`.
    ///
    /// The ciphertext is verified against its checksum sidecar before any
    /// decryption happens. A missing sidecar (written by an older client)
    /// skips verification; a mismatching one fails the download.
    pub async fn download_file(&mut self, key: &str, target: &Path) -> Result<(), EngineError> {
        let version_id = self.resolve_stored_version(key).await?;

        // Sidecar first, so a corrupt body is never written to the target.
        // Its authoritative version is the oldest one, same as the data key;
        // anything newer at the same key is interference maintenance reaps.
        let sidecar_key = naming::checksum_key(key);
        let sidecar_version = self.resolve_stored_version(&sidecar_key).await.ok();
        let expected = match self
            .store
            .get_object(&sidecar_key, sidecar_version.as_deref())
            .await
        {
            Ok(response) => {
                let body = collect_body(response.body).await?;
                Some(String::from_utf8_lossy(&body).into_owned())
            }
            Err(err) if err.is_not_found() => {
                warn!(key, "checksum sidecar missing; skipping verification");
                None
            }
            Err(err) => return Err(err.into()),
        };

        let working = tempfile::tempdir()?;
        let ciphertext_path = working.path().join("archive.age");

        // Stream the ciphertext to disk, hashing as it arrives.
        let response = self.store.get_object(key, Some(&version_id)).await?;
        let mut body = response.body;
        let mut digest = StreamingDigest::new();
        let mut file = tokio::fs::File::create(&ciphertext_path).await?;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|err| EngineError::Io(std::io::Error::other(err)))?
        {
            digest.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = expected {
            integrity::verify_digest(&expected, &digest.finalize_hex(), key)?;
        }

        // Open the sealed stream onto the caller's target path.
        let identity = self.identity.clone();
        let target_path = target.to_owned();
        let sealed_path = ciphertext_path.clone();
        task::spawn_blocking(move || -> Result<(), EngineError> {
            let input = std::fs::File::open(&sealed_path)?;
            let mut output = std::fs::File::create(&target_path)?;
            codec::decrypt_stream(input, &mut output, &identity)
        })
        .await??;

        info!(key, "downloaded archive");
        Ok(())
    }
}
