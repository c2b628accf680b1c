//! Small helpers shared by the S3 wire handlers: XML escaping, HTTP dates,
//! synthetic request identifiers.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

pub const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

pub static AMZ_REQUEST_ID: HeaderName = HeaderName::from_static("x-amz-request-id");
pub static AMZ_ID_2: HeaderName = HeaderName::from_static("x-amz-id-2");

/// Per-response identifiers. They are random and carry no meaning.
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub host_id: String,
}

impl RequestIds {
    pub fn generate() -> Self {
        let request_id = Uuid::new_v4().simple().to_string()[..16].to_ascii_uppercase();
        let mut raw = Uuid::new_v4().as_bytes().to_vec();
        raw.extend_from_slice(Uuid::new_v4().as_bytes());
        Self {
            request_id,
            host_id: general_purpose::STANDARD.encode(raw),
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            headers.insert(AMZ_REQUEST_ID.clone(), value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.host_id) {
            headers.insert(AMZ_ID_2.clone(), value);
        }
    }
}

/// Build an `application/xml` response carrying fresh request ids.
pub fn xml_response(status: StatusCode, xml: String) -> Response {
    xml_response_with_ids(status, xml, &RequestIds::generate())
}

pub fn xml_response_with_ids(status: StatusCode, xml: String, ids: &RequestIds) -> Response {
    let mut response = Response::new(Body::from(xml));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    ids.apply(headers);
    response
}

pub fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// IMF-fixdate, as used by `Date` and `Last-Modified`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn http_date_value(at: DateTime<Utc>) -> HeaderValue {
    HeaderValue::from_str(&http_date(at)).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Timestamp format used inside XML bodies.
pub fn xml_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
