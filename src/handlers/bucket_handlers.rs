//! HTTP handlers for bucket-level operations: list/create/delete buckets,
//! list objects, batch delete, and the sub-resource stubs
//! (`?location`, `?object-lock`, bare `?delimiter`).

use crate::{
    AppState,
    errors::AppError,
    handlers::response::{S3_XMLNS, xml_escape, xml_response, xml_timestamp},
    models::{bucket::BucketInfo, delete::DeleteRequest},
    services::storage_service::{ListObjectsParams, ListObjectsResult, StorageError},
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use tracing::{info, warn};

const DEFAULT_MAX_KEYS: usize = 1000;

/// Characters escaped in listing fields under `encoding-type=url`.
/// Unreserved characters and `/` pass through.
const LIST_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Creation date reported by the sub-resource stubs.
const PLACEHOLDER_CREATION_DATE: &str = "2024-09-16T10:12:24.000Z";

/// Query parameters understood on `/{bucket}/`.
#[derive(Debug, Default, Deserialize)]
pub struct BucketQuery {
    pub location: Option<String>,
    #[serde(rename = "object-lock")]
    pub object_lock: Option<String>,
    pub delete: Option<String>,
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<String>,
    #[serde(rename = "list-type")]
    pub list_type: Option<String>,
    #[serde(rename = "encoding-type")]
    pub encoding_type: Option<String>,
}

impl BucketQuery {
    /// Any listing parameter turns a bucket GET into ListObjects.
    fn is_list_request(&self) -> bool {
        self.prefix.is_some()
            || self.marker.is_some()
            || self.max_keys.is_some()
            || self.list_type.is_some()
            || self.encoding_type.is_some()
    }

    fn url_encoded(&self) -> bool {
        self.encoding_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("url"))
    }

    fn list_params(&self) -> Result<ListObjectsParams, AppError> {
        let max_keys = match self.max_keys.as_deref() {
            None | Some("") => DEFAULT_MAX_KEYS,
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                AppError::bad_request("InvalidArgument", format!("Invalid max-keys value `{raw}`"))
            })?,
        };
        Ok(ListObjectsParams {
            prefix: self.prefix.clone(),
            delimiter: self.delimiter.clone(),
            marker: self.marker.clone(),
            max_keys,
        })
    }
}

/// `GET /` — list every bucket under the storage root.
pub async fn list_buckets(State(state): State<AppState>) -> Response {
    let buckets = state.storage.list_buckets().await;
    info!("listing {} buckets", buckets.len());
    xml_response(StatusCode::OK, build_list_buckets_xml(&buckets))
}

/// `PUT /{bucket}/` — create a bucket, 409 when it already exists.
pub async fn create_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Response, AppError> {
    if state.storage.check_bucket_exists(&bucket).await? {
        return Err(AppError::bucket_already_exists(&bucket));
    }
    state.storage.create_bucket(&bucket).await?;

    let created = BucketInfo {
        name: bucket.clone(),
        creation_date: Utc::now(),
    };
    let mut response = xml_response(StatusCode::OK, build_list_buckets_xml(&[created]));
    if let Ok(location) = HeaderValue::from_str(&format!("/{bucket}")) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

/// `GET /{bucket}/` — dispatches on the query string:
/// `?location`, `?object-lock`, listing parameters, bare `?delimiter`,
/// or a plain existence check.
pub async fn get_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<BucketQuery>,
) -> Result<Response, AppError> {
    if query.location.is_some() {
        let xml = format!(
            "<LocationConstraint>{}</LocationConstraint>",
            xml_escape(&state.region)
        );
        return Ok(xml_response(StatusCode::OK, xml));
    }
    if query.object_lock.is_some() {
        return Ok(bucket_stub(&bucket, "ObjectLockConfiguration"));
    }
    if query.is_list_request() {
        return list_objects(&state, &bucket, &query).await;
    }
    if query.delimiter.is_some() {
        return Ok(bucket_stub(&bucket, "ObjectDelimiter"));
    }

    if !state.storage.check_bucket_exists(&bucket).await? {
        return Err(StorageError::BucketNotFound(bucket).into());
    }
    Ok((
        StatusCode::OK,
        format!("Bucket '{bucket}' exists and is accessible."),
    )
        .into_response())
}

/// `HEAD /{bucket}/` — 200 when the bucket exists, 404 otherwise.
pub async fn head_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.storage.check_bucket_exists(&bucket).await? {
        Ok(StatusCode::OK)
    } else {
        Err(StorageError::BucketNotFound(bucket).into())
    }
}

/// `DELETE /{bucket}/` — remove the bucket and all of its objects.
pub async fn delete_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<StatusCode, AppError> {
    state.storage.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /{bucket}/?delete` — delete every listed key independently.
///
/// Missing or invalid keys are logged and left out of the result; any other
/// failure aborts the batch.
pub async fn delete_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<BucketQuery>,
    body: Bytes,
) -> Result<Response, AppError> {
    if query.delete.is_none() {
        return Err(AppError::bad_request(
            "InvalidRequest",
            "POST on a bucket requires the `delete` sub-resource",
        ));
    }
    if !state.storage.check_bucket_exists(&bucket).await? {
        return Err(StorageError::BucketNotFound(bucket).into());
    }

    let text = std::str::from_utf8(&body)
        .map_err(|_| AppError::bad_request("MalformedXML", "Delete body is not UTF-8"))?;
    let request = DeleteRequest::from_xml(text)
        .map_err(|err| AppError::bad_request("MalformedXML", format!("Error parsing XML: {err}")))?;

    let mut deleted = Vec::new();
    for object in &request.objects {
        match state.storage.delete_object(&bucket, &object.key).await {
            Ok(()) => deleted.push(object.key.as_str()),
            Err(
                err @ (StorageError::ObjectNotFound { .. } | StorageError::InvalidObjectKey { .. }),
            ) => {
                warn!("skipping `{}` in batch delete: {}", object.key, err);
            }
            Err(err) => return Err(err.into()),
        }
    }
    info!(
        "batch delete in {}: {} of {} keys removed",
        bucket,
        deleted.len(),
        request.objects.len()
    );

    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><DeleteResult xmlns="{S3_XMLNS}">"#
    );
    if !request.quiet {
        for key in deleted {
            xml.push_str(&format!("<Deleted><Key>{}</Key></Deleted>", xml_escape(key)));
        }
    }
    xml.push_str("</DeleteResult>");
    Ok(xml_response(StatusCode::OK, xml))
}

async fn list_objects(
    state: &AppState,
    bucket: &str,
    query: &BucketQuery,
) -> Result<Response, AppError> {
    let params = query.list_params()?;
    let result = state.storage.list_objects(bucket, &params).await?;
    let xml = build_list_objects_xml(bucket, &params, &result, query.url_encoded());
    Ok(xml_response(StatusCode::OK, xml))
}

fn bucket_stub(bucket: &str, element: &str) -> Response {
    let xml = format!(
        "<Bucket><Name>{}</Name><CreationDate>{}</CreationDate><{element}>true</{element}></Bucket>",
        xml_escape(bucket),
        PLACEHOLDER_CREATION_DATE,
    );
    xml_response(StatusCode::OK, xml)
}

fn build_list_buckets_xml(buckets: &[BucketInfo]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListAllMyBucketsResult xmlns="{S3_XMLNS}"><Buckets>"#
    );
    for bucket in buckets {
        xml.push_str("<Bucket>");
        xml.push_str(&format!("<Name>{}</Name>", xml_escape(&bucket.name)));
        xml.push_str(&format!(
            "<CreationDate>{}</CreationDate>",
            xml_timestamp(bucket.creation_date)
        ));
        xml.push_str("</Bucket>");
    }
    xml.push_str("</Buckets></ListAllMyBucketsResult>");
    xml
}

fn build_list_objects_xml(
    bucket: &str,
    params: &ListObjectsParams,
    result: &ListObjectsResult,
    url_encoded: bool,
) -> String {
    let field = |value: &str| {
        if url_encoded {
            utf8_percent_encode(value, LIST_ENCODE_SET).to_string()
        } else {
            xml_escape(value)
        }
    };

    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult xmlns="{S3_XMLNS}">"#
    );
    xml.push_str(&format!("<Name>{}</Name>", xml_escape(bucket)));
    xml.push_str(&format!(
        "<Prefix>{}</Prefix>",
        field(params.prefix.as_deref().unwrap_or(""))
    ));
    xml.push_str(&format!(
        "<Marker>{}</Marker>",
        field(params.marker.as_deref().unwrap_or(""))
    ));
    xml.push_str(&format!("<MaxKeys>{}</MaxKeys>", params.max_keys));
    xml.push_str(&format!(
        "<KeyCount>{}</KeyCount>",
        result.objects.len() + result.common_prefixes.len()
    ));
    if let Some(delim) = &params.delimiter {
        xml.push_str(&format!("<Delimiter>{}</Delimiter>", field(delim.as_str())));
    }
    if url_encoded {
        xml.push_str("<EncodingType>url</EncodingType>");
    }
    xml.push_str(&format!("<IsTruncated>{}</IsTruncated>", result.is_truncated));
    if let Some(next) = &result.next_marker {
        xml.push_str(&format!("<NextMarker>{}</NextMarker>", field(next.as_str())));
    }

    for obj in &result.objects {
        xml.push_str("<Contents>");
        xml.push_str(&format!("<Key>{}</Key>", field(obj.key.as_str())));
        xml.push_str(&format!(
            "<LastModified>{}</LastModified>",
            xml_timestamp(obj.last_modified)
        ));
        xml.push_str(&format!("<Size>{}</Size>", obj.size));
        xml.push_str("<StorageClass>STANDARD</StorageClass>");
        xml.push_str("</Contents>");
    }

    for prefix in &result.common_prefixes {
        xml.push_str("<CommonPrefixes><Prefix>");
        xml.push_str(&field(prefix.as_str()));
        xml.push_str("</Prefix></CommonPrefixes>");
    }

    xml.push_str("</ListBucketResult>");
    xml
}
