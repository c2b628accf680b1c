//! Maps bucket names and object keys onto paths beneath the storage root.
//!
//! Layout is a direct mirror: `<root>/<bucket>/<key>`. Keys may contain `/`,
//! in which case they become nested paths under the bucket directory.

use super::storage_service::{StorageError, StorageResult};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::debug;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_BUCKET_NAME_LEN: usize = 255;

#[derive(Clone, Debug)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory backing `bucket`. Does not check for existence.
    pub fn bucket_path(&self, bucket: &str) -> StorageResult<PathBuf> {
        ensure_bucket_name_safe(bucket)?;
        Ok(self.root.join(bucket))
    }

    /// File backing `bucket`/`key`. Does not check for existence.
    pub fn resolve(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        ensure_key_safe(key)?;
        let mut path = self.bucket_path(bucket)?;
        path.extend(key.split('/'));
        Ok(path)
    }

    /// Find a path for `key` that nothing currently occupies.
    ///
    /// Returns the key the object will actually be stored under together
    /// with its path. An occupied `name.ext` is probed as `name-1.ext`,
    /// `name-2.ext`, ... The probe and the later create are not atomic.
    pub async fn unique_path(&self, bucket: &str, key: &str) -> StorageResult<(String, PathBuf)> {
        let path = self.resolve(bucket, key)?;
        if is_free(key, &path).await? {
            return Ok((key.to_string(), path));
        }

        debug!("{} is occupied, probing renamed keys", path.display());
        let mut suffix: u64 = 1;
        loop {
            let candidate = renamed_key(key, suffix);
            let path = self.resolve(bucket, &candidate)?;
            if is_free(&candidate, &path).await? {
                return Ok((candidate, path));
            }
            suffix += 1;
        }
    }
}

async fn is_free(key: &str, path: &Path) -> StorageResult<bool> {
    match fs::symlink_metadata(path).await {
        Ok(_) => Ok(false),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotADirectory => {
            Err(StorageError::InvalidObjectKey {
                key: key.to_string(),
                reason: "a parent segment is an existing object".to_string(),
            })
        }
        Err(err) => Err(StorageError::Io(err)),
    }
}

/// Insert `-{n}` before the extension of the key's last segment.
///
/// A leading dot does not start an extension, so `.env` becomes `.env-1`.
pub fn renamed_key(key: &str, n: u64) -> String {
    let name_start = key.rfind('/').map_or(0, |pos| pos + 1);
    let name = &key[name_start..];
    match name.rfind('.') {
        Some(dot) if dot > 0 => {
            let split = name_start + dot;
            format!("{}-{}{}", &key[..split], n, &key[split..])
        }
        _ => format!("{key}-{n}"),
    }
}

/// Reject keys that could escape the bucket directory or alias another key.
fn ensure_key_safe(key: &str) -> StorageResult<()> {
    let reject = |reason: &str| {
        Err(StorageError::InvalidObjectKey {
            key: key.to_string(),
            reason: reason.to_string(),
        })
    };

    if key.is_empty() {
        return reject("must not be empty");
    }
    if key.len() > MAX_OBJECT_KEY_LEN {
        return reject("must be at most 1024 bytes");
    }
    if key.starts_with('/') {
        return reject("must be relative");
    }
    if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
        return reject("must not contain control characters or backslashes");
    }
    for segment in key.split('/') {
        match segment {
            "" => return reject("must not contain empty path segments"),
            "." | ".." => return reject("must not contain `.` or `..` segments"),
            _ => {}
        }
    }
    Ok(())
}

fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.len() > MAX_BUCKET_NAME_LEN {
        Some("must be at most 255 bytes")
    } else if name.starts_with('.') {
        Some("must not start with a dot")
    } else if name
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
    {
        Some("must not contain separators or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        }),
        None => Ok(()),
    }
}
