// Library exports for Quillpost
// This allows integration tests and the binary to share the same modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod lifecycle;
pub mod routes;
pub mod state;
pub mod storage;
