//! Represents a bucket — a top-level directory under the storage root.

use chrono::{DateTime, Utc};

/// A bucket as reported by ListBuckets.
#[derive(Clone, Debug)]
pub struct BucketInfo {
    /// Directory name, which is also the bucket name.
    pub name: String,

    /// Synthesized at listing time; creation dates are not tracked.
    pub creation_date: DateTime<Utc>,
}
