use crate::{
    handlers::response::{RequestIds, xml_escape, xml_response_with_ids},
    services::storage_service::StorageError,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

/// An S3-style error: HTTP status plus the `<Error>` envelope fields.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub bucket_name: Option<String>,
}

impl AppError {
    /// Create a new AppError with a specific status, S3 code and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
            bucket_name: None,
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket_name = Some(bucket.into());
        self
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, msg)
    }

    pub fn bucket_already_exists(bucket: &str) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "BucketAlreadyExists",
            format!("Bucket '{bucket}' already exists"),
        )
        .with_bucket(bucket)
    }

    fn to_xml(&self, ids: &RequestIds) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Error>"#);
        xml.push_str(&format!("<Code>{}</Code>", self.code));
        xml.push_str(&format!("<Message>{}</Message>", xml_escape(&self.message)));
        if let Some(bucket) = &self.bucket_name {
            xml.push_str(&format!("<BucketName>{}</BucketName>", xml_escape(bucket)));
        }
        xml.push_str(&format!("<RequestId>{}</RequestId>", ids.request_id));
        xml.push_str(&format!("<HostId>{}</HostId>", ids.host_id));
        xml.push_str("</Error>");
        xml
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), "{}", self);
        } else {
            tracing::debug!(status = self.status.as_u16(), "{}", self);
        }

        let ids = RequestIds::generate();
        xml_response_with_ids(self.status, self.to_xml(&ids), &ids)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::BucketNotFound(bucket) => {
                AppError::new(StatusCode::NOT_FOUND, "NoSuchBucket", message).with_bucket(bucket)
            }
            StorageError::BucketAlreadyExists(bucket) => AppError::bucket_already_exists(&bucket),
            StorageError::ObjectNotFound { bucket, .. } => {
                AppError::new(StatusCode::NOT_FOUND, "NoSuchKey", message).with_bucket(bucket)
            }
            StorageError::InvalidBucketName { name, .. } => {
                AppError::bad_request("InvalidBucketName", message).with_bucket(name)
            }
            StorageError::InvalidObjectKey { .. } => {
                AppError::bad_request("InvalidArgument", message)
            }
            StorageError::MalformedStream(_) => AppError::bad_request("IncompleteBody", message),
            StorageError::Io(_) => AppError::internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn maps_storage_errors_to_s3_codes() {
        let cases = [
            (
                StorageError::BucketNotFound("b".into()),
                StatusCode::NOT_FOUND,
                "NoSuchBucket",
            ),
            (
                StorageError::ObjectNotFound {
                    bucket: "b".into(),
                    key: "k".into(),
                },
                StatusCode::NOT_FOUND,
                "NoSuchKey",
            ),
            (
                StorageError::BucketAlreadyExists("b".into()),
                StatusCode::CONFLICT,
                "BucketAlreadyExists",
            ),
            (
                StorageError::MalformedStream("bad size".into()),
                StatusCode::BAD_REQUEST,
                "IncompleteBody",
            ),
            (
                StorageError::Io(io::Error::other("disk gone")),
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError",
            ),
        ];
        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status, status);
            assert_eq!(app.code, code);
        }
    }

    #[test]
    fn envelope_carries_all_fields() {
        let err = AppError::bucket_already_exists("photos");
        let ids = RequestIds {
            request_id: "REQ".into(),
            host_id: "HOST".into(),
        };
        let xml = err.to_xml(&ids);
        assert!(xml.contains("<Code>BucketAlreadyExists</Code>"));
        assert!(xml.contains("<BucketName>photos</BucketName>"));
        assert!(xml.contains("<RequestId>REQ</RequestId>"));
        assert!(xml.contains("<HostId>HOST</HostId>"));
    }
}
