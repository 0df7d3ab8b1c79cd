//! # spider-zenrows
//!
//! Downloader middlewares that route crawl requests through the ZenRows
//! scraping API.
//!
//! ## Overview
//!
//! ZenRows fetches pages on your behalf (rendering JavaScript, rotating
//! residential proxies, bypassing anti-bot systems) and is called as a plain
//! HTTPS GET whose query string carries the target URL and the feature
//! options. This crate provides the glue between a crawler's middleware chain
//! and that API:
//!
//! - **ZenRowsMiddleware**: rewrites requests marked as proxied into provider
//!   calls, merging per-request options over global defaults and validating
//!   them against an allow-list
//! - **ZenRowsRetryMiddleware**: reissues proxied requests on transport
//!   failures or retriable status codes, with a bounded number of attempts
//!   and exponential backoff
//!
//! Both share one immutable [`ZenRowsConfig`](config::ZenRowsConfig).
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use spider_zenrows::prelude::*;
//!
//! let config = Arc::new(
//!     ZenRowsConfig::builder("YOUR_API_KEY")
//!         .js_render(true)
//!         .max_attempts(3)
//!         .build()?,
//! );
//!
//! // Retry first, adapter second: the adapter sees responses before the retry decision.
//! let crawler = CrawlerBuilder::new(MySpider)
//!     .add_middleware(ZenRowsRetryMiddleware::new(config.clone())?)
//!     .add_middleware(ZenRowsMiddleware::new(config))
//!     .build()
//!     .await?;
//!
//! // In the spider:
//! let request = Request::parse_zenrows("https://example.com/login")?
//!     .with_param("session_id", 12345)
//!     .with_param("premium_proxy", true);
//! ```

pub mod adapter;
pub mod config;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod middleware;
pub mod params;
pub mod request;
pub mod response;
pub mod retry;
pub mod settings;

pub use request::Request;
pub use response::Response;

pub mod prelude;
