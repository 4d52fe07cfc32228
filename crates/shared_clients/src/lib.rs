//! Clients for the remote services the stager talks to.

pub mod storage_api;

pub use storage_api::{StorageApiClient, StorageClientError};
