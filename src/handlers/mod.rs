//! HTTP handlers translating store results into S3 wire responses.

pub mod bucket_handlers;
pub mod health_handlers;
pub mod object_handlers;
pub mod response;
