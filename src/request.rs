//! The outgoing crawl request as seen by the ZenRows middlewares.

use bytes::Bytes;
use dashmap::DashMap;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use url::Url;

use crate::error::ZenRowsError;
use crate::params::{ParamValue, ZenRowsParams};

/// Metadata key that opts a request out of retries.
pub const DONT_RETRY: &str = "dont_retry";

/// A request travelling through the middleware chain.
///
/// A request is *proxied* when it carries a [`ZenRowsParams`] mapping, even an
/// empty one. Only proxied requests are rewritten by
/// [`ZenRowsMiddleware`](crate::adapter::ZenRowsMiddleware) and retried by
/// [`ZenRowsRetryMiddleware`](crate::retry::ZenRowsRetryMiddleware).
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub cookies: BTreeMap<String, String>,
    pub body: Option<Bytes>,
    pub meta: DashMap<Cow<'static, str>, Value>,
    pub params: Option<ZenRowsParams>,
    /// The page the caller asked for, remembered once `url` points at the provider.
    target_url: Option<Url>,
    attempt: u32,
}

impl Request {
    /// Creates a plain GET request that is fetched directly.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            cookies: BTreeMap::new(),
            body: None,
            meta: DashMap::new(),
            params: None,
            target_url: None,
            attempt: 1,
        }
    }

    /// Creates a GET request routed through the ZenRows API.
    pub fn zenrows(url: Url, params: ZenRowsParams) -> Self {
        Self {
            params: Some(params),
            ..Self::new(url)
        }
    }

    /// Parses `url` and creates a proxied request with no options.
    pub fn parse_zenrows(url: &str) -> Result<Self, ZenRowsError> {
        Ok(Self::zenrows(Url::parse(url)?, ZenRowsParams::new()))
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_meta(self, key: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Adds a provider option, turning the request into a proxied one if it was not.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params
            .get_or_insert_with(ZenRowsParams::new)
            .insert(name, value);
        self
    }

    pub fn is_proxied(&self) -> bool {
        self.params.is_some()
    }

    /// The page being fetched. For a rewritten request this is the original
    /// URL, not the provider endpoint.
    pub fn target_url(&self) -> &Url {
        self.target_url.as_ref().unwrap_or(&self.url)
    }

    /// Whether `url` currently points at the provider endpoint.
    pub fn is_rewritten(&self) -> bool {
        self.target_url.is_some()
    }

    /// Points the request at `api_url`, remembering the target on first rewrite.
    pub(crate) fn rewrite(&mut self, api_url: Url) {
        if self.target_url.is_none() {
            self.target_url = Some(self.url.clone());
        }
        self.url = api_url;
    }

    /// 1-based number of the transmission this request represents.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn increment_attempt(&mut self) {
        self.attempt += 1;
    }

    /// Whether the `dont_retry` metadata flag is set.
    pub fn dont_retry(&self) -> bool {
        self.meta
            .get(DONT_RETRY)
            .and_then(|v| v.value().as_bool())
            .unwrap_or(false)
    }

    /// Renders the cookie mapping as a `Cookie` header value.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_requests_are_not_proxied() {
        let request = Request::new(Url::parse("https://example.com").unwrap());
        assert!(!request.is_proxied());
        assert_eq!(request.attempt(), 1);
    }

    #[test]
    fn with_param_marks_request_as_proxied() {
        let request = Request::new(Url::parse("https://example.com").unwrap())
            .with_param("js_render", true);
        assert!(request.is_proxied());
        assert_eq!(
            request.params.unwrap().get("js_render"),
            Some(&ParamValue::Bool(true))
        );
    }

    #[test]
    fn rewrite_keeps_first_target() {
        let mut request = Request::parse_zenrows("https://example.com/page").unwrap();
        request.rewrite(Url::parse("https://api.zenrows.com/v1/?a=1").unwrap());
        request.rewrite(Url::parse("https://api.zenrows.com/v1/?a=2").unwrap());

        assert!(request.is_rewritten());
        assert_eq!(request.target_url().as_str(), "https://example.com/page");
        assert_eq!(request.url.as_str(), "https://api.zenrows.com/v1/?a=2");
    }

    #[test]
    fn dont_retry_reads_meta() {
        let request = Request::parse_zenrows("https://example.com")
            .unwrap()
            .with_meta(DONT_RETRY, true);
        assert!(request.dont_retry());
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let request = Request::parse_zenrows("https://example.com")
            .unwrap()
            .with_cookie("session", "abc123")
            .with_cookie("lang", "en");
        assert_eq!(
            request.cookie_header().as_deref(),
            Some("lang=en; session=abc123")
        );
    }
}
