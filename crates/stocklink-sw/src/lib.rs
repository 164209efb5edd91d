//! # Stock-Link Offline Worker
//!
//! Offline cache and update propagation for the Stock-Link application.
//!
//! ## Features
//!
//! - **Lifecycle**: install, activate, fetch, message events
//! - **Versioned caches**: one `{app}-{version}` store is current at a time
//! - **Fetch interception**: cache-first or network-first answering
//! - **Client messaging**: reload and new-version broadcasts to open tabs
//!
//! ## Architecture
//!
//! ```text
//! OfflineWorker
//!     ├── CacheStorage
//!     │       └── AssetCache ({app}-{version})
//!     │               └── URL → CachedResponse
//!     ├── ClientRegistry
//!     │       └── WorkerClient (message channel per open tab)
//!     └── UpdatePoller (GET /api/version, broadcast on change)
//! ```
//!
//! The worker runs single-threaded from the host's point of view: install
//! fully resolves before activate, and activate fully resolves before any
//! fetch is intercepted. Concurrent fetches may race on cache writes;
//! last write wins, entries are idempotent re-fetches of the same URL.

use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod fetch;
pub mod update;
pub mod worker;

pub use cache::{AssetCache, CacheStorage, CachedResponse};
pub use clients::{ClientId, ClientKind, ClientMessage, ClientRegistry, WorkerClient, WorkerCommand};
pub use fetch::{AssetFetcher, FetchDecision, RequestMode, ResponseKind, SwRequest, SwResponse};
pub use update::{RemoteVersion, UpdatePoller};
pub use worker::{OfflineWorker, WorkerState};

/// Errors that can occur in the offline worker.
#[derive(Error, Debug, Clone)]
pub enum SwError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<url::ParseError> for SwError {
    fn from(e: url::ParseError) -> Self {
        SwError::InvalidUrl(e.to_string())
    }
}
