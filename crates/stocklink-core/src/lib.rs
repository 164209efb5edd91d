//! Stock-Link Core Library
//!
//! Shared types, errors, configuration, and logging setup for Stock-Link.

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;
pub mod types;

pub use config::{AppConfig, CacheConfig, CheckoutConfig, FetchPolicy, UpdatePollConfig};
pub use error::{StockLinkError, StockLinkResult};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, with_timeout, RetryConfig};
pub use types::{GeoPoint, Product, ProductId, SaleId, UserRole};
