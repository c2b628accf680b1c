//! src/services/storage_service.rs
//!
//! StorageService — bucket and object lifecycle on top of a plain directory
//! tree. The filesystem is the only index: a bucket exists iff
//! `root/{bucket}` is a directory, an object exists iff `root/{bucket}/{key}`
//! is a regular file. No locks are taken; concurrent writers race on the
//! filesystem exactly as the underlying calls allow.

use super::{
    chunk_decoder::{self, DecodeError, UploadEncoding},
    path_resolver::PathResolver,
};
use crate::models::{
    bucket::BucketInfo,
    object::{ObjectInfo, StoredObject},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use md5::Context;
use std::{
    collections::BTreeSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    pin::Pin,
    task::{Poll, ready},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncWrite, AsyncWriteExt, BufReader},
};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default)]
pub struct ListObjectsParams {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub max_keys: usize,
}

#[derive(Debug)]
pub struct ListObjectsResult {
    pub objects: Vec<ObjectInfo>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("object key `{key}` invalid: {reason}")]
    InvalidObjectKey { key: String, reason: String },
    #[error("{0}")]
    MalformedStream(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<DecodeError> for StorageError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Malformed(reason) => StorageError::MalformedStream(reason),
            DecodeError::Io(err) => StorageError::Io(err),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the S3-like operations over `root`:
/// - buckets are top-level directories
/// - objects are files beneath them, never overwritten on PUT
/// - uploads optionally pass through the chunk decoder
#[derive(Clone, Debug)]
pub struct StorageService {
    resolver: PathResolver,
}

impl StorageService {
    /// Create a service rooted at `base_path`. The directory is not created here.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            resolver: PathResolver::new(base_path),
        }
    }

    pub fn base_path(&self) -> &Path {
        self.resolver.root()
    }

    /// Create the bucket directory, including missing parents.
    ///
    /// Succeeds when the directory already exists; conflict detection is the
    /// caller's concern. A non-directory entry occupying the name is reported
    /// as `BucketAlreadyExists`.
    pub async fn create_bucket(&self, name: &str) -> StorageResult<()> {
        let path = self.resolver.bucket_path(name)?;
        fs::create_dir_all(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::AlreadyExists {
                StorageError::BucketAlreadyExists(name.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;
        info!("created bucket {} at {}", name, path.display());
        Ok(())
    }

    pub async fn check_bucket_exists(&self, name: &str) -> StorageResult<bool> {
        let path = self.resolver.bucket_path(name)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if is_absent(&err) => Ok(false),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// List bucket directories under the root, sorted by name.
    ///
    /// Read failures are logged and yield an empty list.
    pub async fn list_buckets(&self) -> Vec<BucketInfo> {
        match self.read_buckets().await {
            Ok(buckets) => buckets,
            Err(err) => {
                warn!(
                    "failed to list buckets under {}: {}",
                    self.base_path().display(),
                    err
                );
                Vec::new()
            }
        }
    }

    async fn read_buckets(&self) -> io::Result<Vec<BucketInfo>> {
        let mut entries = fs::read_dir(self.base_path()).await?;
        let mut buckets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                debug!("skipping non UTF-8 directory {:?}", entry.file_name());
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            buckets.push(BucketInfo {
                name,
                creation_date: Utc::now(),
            });
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    /// Recursively remove a bucket and everything in it.
    pub async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        let path = self.resolver.bucket_path(name)?;
        if !self.check_bucket_exists(name).await? {
            debug!("bucket {} does not exist", name);
            return Err(StorageError::BucketNotFound(name.to_string()));
        }

        fs::remove_dir_all(&path).await.map_err(|err| {
            if is_absent(&err) {
                StorageError::BucketNotFound(name.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;
        info!("deleted bucket {}", name);
        Ok(())
    }

    /// Stream an upload to disk.
    ///
    /// - Resolves a free path; an occupied key is renamed (`k.ext` → `k-1.ext`).
    /// - Decodes AWS chunk framing when `encoding` says so.
    /// - Computes the MD5 etag and size of the stored payload while writing.
    ///
    /// The partial file is removed if the upload fails midway.
    pub async fn add_object<S>(
        &self,
        bucket: &str,
        key: &str,
        encoding: UploadEncoding,
        stream: S,
    ) -> StorageResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        if !self.check_bucket_exists(bucket).await? {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }

        let (stored_key, file_path) = self.resolver.unique_path(bucket, key).await?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        debug!("writing {}/{} to {}", bucket, key, file_path.display());

        let file = File::create(&file_path).await?;
        let mut sink = DigestWriter::new(file);

        if let Err(err) = write_payload(stream, encoding, &mut sink).await {
            drop(sink);
            if let Err(cleanup) = fs::remove_file(&file_path).await {
                debug!(
                    "could not remove partial upload {}: {}",
                    file_path.display(),
                    cleanup
                );
            }
            return Err(err);
        }

        let (file, digest, size) = sink.finish();
        file.sync_all().await?;

        info!(
            "stored {} bytes for {}/{} at {}",
            size,
            bucket,
            stored_key,
            file_path.display()
        );
        Ok(StoredObject {
            key: stored_key,
            size,
            etag: format!("{:x}", digest.compute()),
        })
    }

    /// Read the whole payload of an object into memory.
    pub async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<(Bytes, ObjectInfo)> {
        let path = self.resolver.resolve(bucket, key)?;
        let info = self.stat_object(key, &path).await?.ok_or_else(|| {
            StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
        })?;
        let data = fs::read(&path)
            .await
            .map_err(|err| not_found_or_io(err, bucket, key))?;
        Ok((Bytes::from(data), info))
    }

    /// Open an object for streaming out, together with its metadata.
    pub async fn open_object(&self, bucket: &str, key: &str) -> StorageResult<(ObjectInfo, File)> {
        let path = self.resolver.resolve(bucket, key)?;
        let info = self.stat_object(key, &path).await?.ok_or_else(|| {
            StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
        })?;
        let file = File::open(&path)
            .await
            .map_err(|err| not_found_or_io(err, bucket, key))?;
        Ok((info, file))
    }

    /// Look an object up without reading it. Absence is `Ok(None)`.
    pub async fn check_object_exist(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<Option<ObjectInfo>> {
        let path = self.resolver.resolve(bucket, key)?;
        self.stat_object(key, &path).await
    }

    async fn stat_object(&self, key: &str, path: &Path) -> StorageResult<Option<ObjectInfo>> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: meta.len(),
                last_modified: modified_time(&meta),
            })),
            Ok(_) => Ok(None),
            Err(err) if is_absent(&err) => Ok(None),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Remove a single object and prune directories it leaves empty.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = self.resolver.resolve(bucket, key)?;
        if self.stat_object(key, &path).await?.is_none() {
            debug!("object {} does not exist in bucket {}", key, bucket);
            return Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        fs::remove_file(&path)
            .await
            .map_err(|err| not_found_or_io(err, bucket, key))?;
        info!("deleted object {}/{}", bucket, key);

        if let Some(parent) = path.parent() {
            let bucket_root = self.resolver.bucket_path(bucket)?;
            self.prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    /// List objects in lexicographic key order.
    ///
    /// Supports:
    /// - prefix filtering
    /// - marker (keys strictly after it)
    /// - delimiter grouping into common prefixes
    /// - truncation at `max_keys` entries (objects plus prefixes)
    pub async fn list_objects(
        &self,
        bucket: &str,
        params: &ListObjectsParams,
    ) -> StorageResult<ListObjectsResult> {
        let bucket_root = self.resolver.bucket_path(bucket)?;
        if !self.check_bucket_exists(bucket).await? {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }

        let prefix = params.prefix.as_deref().unwrap_or("");
        let marker = params.marker.as_deref().filter(|m| !m.is_empty());
        let delimiter = params.delimiter.as_deref().filter(|d| !d.is_empty());

        let mut all = walk_objects(&bucket_root).await?;
        all.retain(|obj| obj.key.starts_with(prefix));
        all.sort_by(|a, b| a.key.cmp(&b.key));

        let mut objects = Vec::new();
        let mut common_prefixes = BTreeSet::new();
        let mut is_truncated = false;
        let mut next_marker = None;
        let mut last_entry: Option<String> = None;

        for obj in all {
            if marker.is_some_and(|m| obj.key.as_str() <= m) {
                continue;
            }

            let grouped = delimiter.and_then(|d| compute_common_prefix(&obj.key, prefix, d));
            if let Some(group) = &grouped {
                if common_prefixes.contains(group) {
                    continue;
                }
                if marker.is_some_and(|m| m.starts_with(group.as_str())) {
                    continue;
                }
            }

            if objects.len() + common_prefixes.len() >= params.max_keys {
                is_truncated = true;
                next_marker = last_entry;
                break;
            }

            match grouped {
                Some(group) => {
                    last_entry = Some(group.clone());
                    common_prefixes.insert(group);
                }
                None => {
                    last_entry = Some(obj.key.clone());
                    objects.push(obj);
                }
            }
        }

        Ok(ListObjectsResult {
            objects,
            common_prefixes: common_prefixes.into_iter().collect(),
            is_truncated,
            next_marker,
        })
    }

    /// Recursively remove empty directories up to bucket root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

async fn write_payload<S>(
    stream: S,
    encoding: UploadEncoding,
    sink: &mut DigestWriter,
) -> StorageResult<()>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    let reader = StreamReader::new(stream);
    futures::pin_mut!(reader);

    match encoding {
        UploadEncoding::AwsChunked => {
            debug!("decoding chunked upload");
            let mut buffered = BufReader::new(reader);
            chunk_decoder::decode_chunked(&mut buffered, sink).await?;
        }
        UploadEncoding::Raw => {
            tokio::io::copy(&mut reader, sink).await?;
            sink.flush().await?;
        }
    }
    Ok(())
}

/// Walk a bucket directory and collect every regular file as an object.
async fn walk_objects(bucket_root: &Path) -> StorageResult<Vec<ObjectInfo>> {
    let mut objects = Vec::new();
    let mut pending = vec![bucket_root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let Some(key) = relative_key(bucket_root, &path) else {
                debug!("skipping non UTF-8 path {}", path.display());
                continue;
            };
            let meta = entry.metadata().await?;
            objects.push(ObjectInfo {
                key,
                size: meta.len(),
                last_modified: modified_time(&meta),
            });
        }
    }
    Ok(objects)
}

fn relative_key(bucket_root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_root).ok()?;
    let segments = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(segments.join("/"))
}

fn modified_time(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

/// Errors meaning "nothing is there": the entry is missing, or a parent
/// segment of its path is a regular file.
fn is_absent(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

fn not_found_or_io(err: io::Error, bucket: &str, key: &str) -> StorageError {
    if is_absent(&err) {
        StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else {
        StorageError::Io(err)
    }
}

/// Compute a synthetic "common prefix" for S3 list semantics.
///
/// Returns Some(prefix) if the part of `key` after `requested_prefix` contains
/// the delimiter, otherwise None.
fn compute_common_prefix(key: &str, requested_prefix: &str, delimiter: &str) -> Option<String> {
    let after_prefix = key.strip_prefix(requested_prefix)?;
    let pos = after_prefix.find(delimiter)?;
    let mut combined = String::from(requested_prefix);
    combined.push_str(&after_prefix[..pos + delimiter.len()]);
    Some(combined)
}

/// File writer that hashes and counts everything passing through it.
struct DigestWriter {
    inner: File,
    digest: Context,
    written: u64,
}

impl DigestWriter {
    fn new(inner: File) -> Self {
        Self {
            inner,
            digest: Context::new(),
            written: 0,
        }
    }

    fn finish(self) -> (File, Context, u64) {
        (self.inner, self.digest, self.written)
    }
}

impl AsyncWrite for DigestWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let n = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        this.digest.consume(&buf[..n]);
        this.written += n as u64;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
