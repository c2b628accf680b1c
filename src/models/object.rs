//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};

/// Metadata of a stored object, read from the file it lives in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key relative to the bucket, `/`-separated.
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// File modification time.
    pub last_modified: DateTime<Utc>,
}

/// Outcome of a successful upload.
#[derive(Clone, Debug)]
pub struct StoredObject {
    /// Key the payload was written under. Differs from the requested key
    /// when that key was already taken.
    pub key: String,

    /// Number of payload bytes written (after chunk decoding).
    pub size: u64,

    /// Hex MD5 of the stored payload.
    pub etag: String,
}
