//! Defines routes for all S3-style bucket and object operations.
//!
//! ## Structure
//! - **Service-level endpoints**
//!   - `GET    /` — list buckets
//!   - `GET    /healthz`, `GET /readyz` — liveness and readiness
//!   - `GET|HEAD /probe-bsign*` — answered by middleware
//!
//! - **Bucket-level endpoints** (with or without trailing slash)
//!   - `GET    /{bucket}/` — info, `?location`, `?object-lock`, list objects
//!   - `HEAD   /{bucket}/` — existence check
//!   - `PUT    /{bucket}/` — create bucket
//!   - `DELETE /{bucket}/` — delete bucket
//!   - `POST   /{bucket}/?delete` — batch delete
//!
//! - **Object-level endpoints**
//!   - `PUT    /{bucket}/{*key}` — upload object
//!   - `GET    /{bucket}/{*key}` — download object
//!   - `HEAD   /{bucket}/{*key}` — retrieve metadata only
//!   - `DELETE /{bucket}/{*key}` — delete object
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    AppState,
    handlers::{
        bucket_handlers::{
            create_bucket, delete_bucket, delete_objects, get_bucket, head_bucket, list_buckets,
        },
        health_handlers::{healthz, probe_bsign, readyz},
        object_handlers::{delete_object, get_object, head_object, put_object},
    },
};
use axum::{
    Router, middleware,
    routing::{MethodRouter, get, put},
};
use tower_http::trace::TraceLayer;

/// Build the router for all S3-compatible routes.
///
/// The router carries shared state (`AppState`) to all handlers; probe
/// handling and access logging wrap every route.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_buckets))
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Object-level routes
        .route(
            "/{bucket}/{*key}",
            put(put_object)
                .get(get_object)
                .head(head_object)
                .delete(delete_object),
        )
        // Bucket-level routes
        .route("/{bucket}", bucket_routes())
        .route("/{bucket}/", bucket_routes())
        .layer(middleware::from_fn(probe_bsign))
        .layer(TraceLayer::new_for_http())
}

fn bucket_routes() -> MethodRouter<AppState> {
    get(get_bucket)
        .head(head_bucket)
        .put(create_bucket)
        .delete(delete_bucket)
        .post(delete_objects)
}
