//! Responses handed back to the middleware chain.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use url::Url;

use crate::request::Request;

/// A downloaded response, together with the request that produced it.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    request: Request,
}

impl Response {
    pub fn new(request: Request, status: StatusCode) -> Self {
        Self {
            url: request.url.clone(),
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request,
        }
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns a copy of the originating request, ready to be reissued.
    pub fn request_from_response(&self) -> Request {
        self.request.clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
