//! REST API access for list views and mutations.
//!
//! `ListBackend` is the seam the cache and mutation coordinator depend on;
//! `ApiClient` implements it over reqwest with bearer-token authentication.
//! Every failure is mapped into the shared `ApiError` taxonomy.

pub mod backend;
pub mod client;
pub mod error;

pub use backend::{ListBackend, ListFetcher};
pub use client::ApiClient;
pub use error::ApiError;
