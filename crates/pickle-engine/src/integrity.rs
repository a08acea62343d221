//! Ciphertext integrity: SHA-256 digests and sidecar comparison.
//!
//! The sidecar body is the lowercase hex SHA-256 of the data object's
//! ciphertext: 64 ASCII bytes, no trailing newline. Download recomputes the
//! digest over the fetched bytes and compares against the sidecar before any
//! decryption happens.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::EngineError;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// An incrementally fed SHA-256 digest.
#[derive(Debug, Default)]
pub struct StreamingDigest {
    hasher: Sha256,
}

impl StreamingDigest {
    /// Start a fresh digest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Finish, returning the lowercase hex digest.
    #[must_use]
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Lowercase hex SHA-256 of an in-memory body.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Lowercase hex SHA-256 of a file's contents, streamed.
pub fn sha256_hex_of_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut digest = StreamingDigest::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        digest.update(&buffer[..read]);
    }
    Ok(digest.finalize_hex())
}

/// Base64 CRC32C of a file's contents, streamed, in wire-header form.
pub fn crc32c_base64_of_file(path: &Path) -> io::Result<String> {
    use base64::Engine;

    let mut file = File::open(path)?;
    let mut sum: u32 = 0;
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        sum = crc32c::crc32c_append(sum, &buffer[..read]);
    }
    Ok(base64::engine::general_purpose::STANDARD.encode(sum.to_be_bytes()))
}

/// Compare a sidecar digest against the digest of the fetched ciphertext.
///
/// The sidecar value is trimmed before comparison, tolerating trailing
/// whitespace written by older clients.
pub fn verify_digest(expected: &str, actual: &str, key: &str) -> Result<(), EngineError> {
    if expected.trim() == actual {
        Ok(())
    } else {
        Err(EngineError::ChecksumMismatch {
            key: key.to_owned(),
        })
    }
}
