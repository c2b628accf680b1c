//! dirstore - an S3-compatible gateway over a plain directory tree
//!
//! Buckets are top-level directories under a storage root and objects are the
//! files inside them. The crate provides:
//! - a decoder for AWS signed chunk framing (`STREAMING-AWS4-HMAC-SHA256-PAYLOAD`)
//! - a path resolver with rename-on-collision for uploads
//! - the bucket/object store itself
//! - axum handlers speaking the S3 REST wire format

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

use axum::Router;
use services::storage_service::StorageService;

/// Shared application state handed to every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub storage: StorageService,
    /// Value reported for `?location` queries.
    pub region: String,
}

impl AppState {
    pub fn new(storage: StorageService, region: impl Into<String>) -> Self {
        Self {
            storage,
            region: region.into(),
        }
    }
}

/// Build the full application router bound to `state`.
pub fn app(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
