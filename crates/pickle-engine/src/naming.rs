//! Key construction for the archive object family.
//!
//! A logical archive decomposes into two stored objects:
//!
//! - the data object at `{sanitized_path}.age.{archive_id}`,
//! - its checksum sidecar at `_pickle/checksum/{data_key}.sha256`.
//!
//! The `_pickle/` prefix is reserved for engine bookkeeping; data keys never
//! start with it. The soft-delete registry lives at the single key
//! [`REGISTRY_KEY`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use svix_ksuid::{Ksuid, KsuidLike};

/// Reserved prefix for engine bookkeeping objects.
pub const RESERVED_PREFIX: &str = "_pickle/";

/// Prefix under which checksum sidecars are stored.
pub const CHECKSUM_PREFIX: &str = "_pickle/checksum/";

/// Key of the soft-delete registry object.
pub const REGISTRY_KEY: &str = "_pickle/deleted";

/// Separator between the sanitized path and the archive id in a data key.
const DATA_KEY_SEPARATOR: &str = ".age.";

/// Suffix of every checksum sidecar key.
const CHECKSUM_SUFFIX: &str = ".sha256";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").unwrap_or_else(|_| unreachable!("whitespace pattern is valid"))
});
static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^0-9a-zA-Z!\-_.*'()/]").unwrap_or_else(|_| unreachable!("charset pattern is valid"))
});

/// Sanitize a user-chosen path for use in an object key: runs of whitespace
/// collapse to a single `_`, and any character outside
/// `[0-9a-zA-Z!\-_.*'()/]` is removed.
#[must_use]
pub fn sanitize_path(input: &str) -> String {
    let collapsed = WHITESPACE.replace_all(input, "_");
    UNSAFE_CHARS.replace_all(&collapsed, "").into_owned()
}

// ---------------------------------------------------------------------------
// ArchiveId
// ---------------------------------------------------------------------------

/// Number of base62 characters in a rendered archive id.
const ARCHIVE_ID_LEN: usize = 27;

/// A K-sortable identifier embedded in every data key.
///
/// Generated once per upload and never reused; it survives content rewrites
/// at the same path, so it (not the store's version id) is the real version
/// axis of an archive. The base62 rendering compares lexicographically in
/// generation order, which path-level latest-version selection relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveId(String);

impl ArchiveId {
    /// Generate a fresh id for the current instant.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ksuid::new(None, None).to_string())
    }

    /// Parse a rendered id: exactly 27 base62 characters.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let valid = input.len() == ARCHIVE_ID_LEN
            && input.bytes().all(|b| b.is_ascii_alphanumeric());
        valid.then(|| Self(input.to_owned()))
    }

    /// The rendered id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Key construction and classification
// ---------------------------------------------------------------------------

/// Build a data-object key from an (already sanitized) path and archive id.
#[must_use]
pub fn data_key(sanitized_path: &str, id: &ArchiveId) -> String {
    format!("{sanitized_path}{DATA_KEY_SEPARATOR}{id}")
}

/// Build the checksum-sidecar key for a data key.
#[must_use]
pub fn checksum_key(data_key: &str) -> String {
    format!("{CHECKSUM_PREFIX}{data_key}{CHECKSUM_SUFFIX}")
}

/// Split a data key into its user-facing path and archive id.
///
/// Returns `None` for keys that are not data keys: bookkeeping keys under
/// `_pickle/`, or keys without a trailing `.age.{id}`.
#[must_use]
pub fn parse_data_key(key: &str) -> Option<(&str, ArchiveId)> {
    if key.starts_with(RESERVED_PREFIX) {
        return None;
    }
    let (path, id) = key.rsplit_once(DATA_KEY_SEPARATOR)?;
    if path.is_empty() {
        return None;
    }
    Some((path, ArchiveId::parse(id)?))
}

/// Whether a stored key is an archive data object.
#[must_use]
pub fn is_data_key(key: &str) -> bool {
    parse_data_key(key).is_some()
}

/// Whether a stored key is a checksum sidecar.
#[must_use]
pub fn is_checksum_key(key: &str) -> bool {
    key.starts_with(CHECKSUM_PREFIX)
}
