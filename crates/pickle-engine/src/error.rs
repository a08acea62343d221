//! Archive engine error types.

use std::fmt;

use pickle_store::StoreError;

/// Error surfaced by the archive engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A required piece of configuration is absent.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// An object store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The downloaded ciphertext does not match its checksum sidecar.
    #[error("checksums do not match. file {key} may have been corrupted")]
    ChecksumMismatch {
        /// The data key whose verification failed.
        key: String,
    },

    /// No stored version exists for the requested archive key.
    #[error("couldn't find stored version for object {key}")]
    UnknownArchive {
        /// The requested data key.
        key: String,
    },

    /// Sealing the ciphertext stream failed.
    #[error("encrypt archive: {0}")]
    Encrypt(#[from] age::EncryptError),

    /// Opening the ciphertext stream failed: wrong identity or a tampered
    /// header.
    #[error("decrypt archive: {0}")]
    Decrypt(#[from] age::DecryptError),

    /// Local file handling failed.
    #[error("archive io: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking worker task failed to complete.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Extending retention on one stored version failed.
    #[error("set retention {key}: {source}")]
    SetRetention {
        /// The key whose retention update failed.
        key: String,
        /// The underlying storage failure.
        #[source]
        source: StoreError,
    },

    /// Stream-copying one object between buckets failed.
    #[error("copy object {key}: {source}")]
    CopyObject {
        /// The key being copied.
        key: String,
        /// The underlying storage failure.
        #[source]
        source: StoreError,
    },

    /// A batched delete failed at the call level.
    #[error("delete objects: {source}")]
    DeleteObjects {
        /// The underlying storage failure.
        #[source]
        source: StoreError,
    },

    /// Re-persisting the deletion registry failed.
    #[error("persist delete registry: {source}")]
    PersistRegistry {
        /// The underlying failure.
        #[source]
        source: Box<EngineError>,
    },

    /// One or more failures accumulated across a maintenance pass.
    #[error("{0}")]
    Maintenance(ErrorList),
}

/// A list of errors joined into one, in the order they occurred.
#[derive(Debug, Default)]
pub struct ErrorList(pub Vec<EngineError>);

impl ErrorList {
    /// Whether any error was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Collect another error.
    pub fn push(&mut self, err: EngineError) {
        self.0.push(err);
    }

    /// Resolve to `Ok` when empty, or a joined [`EngineError::Maintenance`].
    pub fn into_result(self) -> Result<(), EngineError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Maintenance(self))
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}
