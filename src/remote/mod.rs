//! Remote store abstraction layer.
//!
//! Trait-based boundary for replaying pending operations:
//! - REST upsert client for production
//! - Mock store for testing

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpRemoteStore;
pub use mock::MockRemoteStore;
pub use traits::{RemoteError, RemoteStore};
