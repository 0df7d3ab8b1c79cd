//! Transport used to send (already rewritten) requests.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::COOKIE;
use std::time::Duration;
use tracing::trace;

use crate::error::ZenRowsError;
use crate::request::Request;
use crate::response::Response;

/// ZenRows renders pages server-side; requests with `js_render` and `wait`
/// regularly take well over a minute.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Client handed to `Middleware::process_request`.
    type Client: Send + Sync + 'static;

    fn client(&self) -> &Self::Client;

    async fn download(&self, request: &Request) -> Result<Response, ZenRowsError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestDownloader {
    client: Client,
}

impl ReqwestDownloader {
    pub fn new() -> Result<Self, ZenRowsError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for ReqwestDownloader {
    type Client = Client;

    fn client(&self) -> &Client {
        &self.client
    }

    async fn download(&self, request: &Request) -> Result<Response, ZenRowsError> {
        trace!("Downloading {} {}", request.method, request.target_url());

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(cookies) = request.cookie_header() {
            builder = builder.header(COOKIE, cookies);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(Response::new(request.clone(), status)
            .with_url(url)
            .with_headers(headers)
            .with_body(body))
    }
}
