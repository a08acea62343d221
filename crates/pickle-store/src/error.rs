//! Object store error types.
//!
//! Every storage call resolves to a [`StoreError`] classified as either
//! retriable (network failures, 5xx responses) or fatal (4xx responses,
//! decode failures). The retry wrapper in [`crate::retry`] consults
//! [`StoreError::is_retriable`] and converts an exhausted retriable error
//! into [`StoreError::RetriesExceeded`].

/// Error produced by an object store adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The service answered with an error status.
    #[error("{operation} failed with status {status}: {message}")]
    Service {
        /// The storage operation that failed.
        operation: &'static str,
        /// The HTTP status code.
        status: u16,
        /// The service's error message.
        message: String,
    },

    /// The request never produced a service response (connection, DNS,
    /// timeout, or dispatch failure).
    #[error("{operation} request failed: {message}")]
    Network {
        /// The storage operation that failed.
        operation: &'static str,
        /// Description of the transport failure.
        message: String,
    },

    /// A retriable error survived every attempt.
    #[error("retries exceeded: {source}")]
    RetriesExceeded {
        /// The final attempt's error.
        #[source]
        source: Box<StoreError>,
    },

    /// The requested object (or version) does not exist.
    #[error("object not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// A required metadata entry is absent from the response.
    #[error("{name} metadata missing from {key}")]
    MissingMetadata {
        /// The metadata entry name.
        name: &'static str,
        /// The key whose response lacked it.
        key: String,
    },

    /// A response or payload could not be decoded.
    #[error("could not decode {context}: {message}")]
    Decode {
        /// What was being decoded.
        context: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Reading or writing a local body failed.
    #[error("body io: {0}")]
    BodyIo(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the retry wrapper should try the call again.
    ///
    /// Network failures and 5xx responses are retriable; everything else is
    /// fatal to the call.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this error means the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Service { status, .. } => *status == 404,
            _ => false,
        }
    }
}
