//! Data shapes exchanged between the store and the S3 wire layer.
//!
//! Nothing here is persisted: bucket and object metadata are read straight
//! from the filesystem on every request.

pub mod bucket;
pub mod delete;
pub mod object;
