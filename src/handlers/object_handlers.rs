//! HTTP handlers for object operations.
//! Streams object bodies in both directions and delegates storage concerns
//! to `StorageService`.

use crate::{
    AppState,
    errors::AppError,
    handlers::response::{RequestIds, http_date_value},
    models::object::ObjectInfo,
    services::{chunk_decoder::UploadEncoding, storage_service::StorageError},
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use futures::StreamExt;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

static DECODED_CONTENT_LENGTH: HeaderName =
    HeaderName::from_static("x-amz-decoded-content-length");
static CONTENT_SHA256: HeaderName = HeaderName::from_static("x-amz-content-sha256");

/// `PUT /{bucket}/{*key}` — upload an object.
///
/// Requires `X-Amz-Decoded-Content-Length`. A body announced as
/// `STREAMING-AWS4-HMAC-SHA256-PAYLOAD` is chunk-decoded before it is stored.
/// An existing key is never overwritten; the upload lands on a renamed key.
pub async fn put_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let declared_len = decoded_content_length(&headers)?;
    let encoding = UploadEncoding::from_content_sha256(
        headers.get(&CONTENT_SHA256).and_then(|v| v.to_str().ok()),
    );

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let stored = state
        .storage
        .add_object(&bucket, &key, encoding, stream)
        .await?;

    if stored.size != declared_len {
        warn!(
            "{}/{}: decoded content length announced {} bytes, stored {}",
            bucket, stored.key, declared_len, stored.size
        );
    }
    info!("uploaded {}/{} as {}", bucket, key, stored.key);

    let mut response = Response::new(Body::empty());
    let resp_headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", stored.etag)) {
        resp_headers.insert(header::ETAG, value);
    }
    resp_headers.insert(header::DATE, http_date_value(Utc::now()));
    RequestIds::generate().apply(resp_headers);
    Ok(response)
}

/// `GET /{bucket}/{*key}` — download an object as a streaming response.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (info, file) = state.storage.open_object(&bucket, &key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    set_object_headers(headers, &info);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Some(value) = content_disposition(&key) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `HEAD /{bucket}/{*key}` — size and modification time, no body.
pub async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let info = state
        .storage
        .check_object_exist(&bucket, &key)
        .await?
        .ok_or(StorageError::ObjectNotFound { bucket, key })?;

    let mut response = Response::new(Body::empty());
    set_object_headers(response.headers_mut(), &info);
    Ok(response)
}

/// `DELETE /{bucket}/{*key}` — remove a single object.
pub async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.storage.delete_object(&bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn decoded_content_length(headers: &HeaderMap) -> Result<u64, AppError> {
    let raw = headers.get(&DECODED_CONTENT_LENGTH).ok_or_else(|| {
        AppError::bad_request(
            "MissingContentLength",
            "Missing X-Amz-Decoded-Content-Length header",
        )
    })?;
    raw.to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            AppError::bad_request(
                "InvalidArgument",
                "X-Amz-Decoded-Content-Length must be a non-negative integer",
            )
        })
}

fn set_object_headers(headers: &mut HeaderMap, info: &ObjectInfo) {
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(info.size));
    headers.insert(header::LAST_MODIFIED, http_date_value(info.last_modified));
}

fn content_disposition(key: &str) -> Option<HeaderValue> {
    let filename = key.rsplit('/').next().unwrap_or(key);
    let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
    HeaderValue::from_str(&format!("attachment; filename=\"{escaped}\"")).ok()
}
