//! Commonly used items from the `spider-zenrows` crate.

pub use crate::request::Request;
pub use crate::response::Response;

pub use crate::adapter::ZenRowsMiddleware;
pub use crate::config::{RetryConfig, ZenRowsConfig};
pub use crate::error::ZenRowsError;
pub use crate::params::{ParamValue, ValidationWarning, ZenRowsParams};
pub use crate::retry::{RetryDecision, RetryPolicy, RetryReason, ZenRowsRetryMiddleware};
pub use crate::settings::Settings;

pub use crate::downloader::{Downloader, ReqwestDownloader};
pub use crate::fetcher::Fetcher;

// Re-export the core middleware trait
pub use crate::middleware::{Middleware, MiddlewareAction};
