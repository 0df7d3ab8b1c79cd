//! ZenRows request adapter.
//!
//! `ZenRowsMiddleware` rewrites proxied requests into calls against the
//! ZenRows API: the target URL moves into the `url` query parameter, the
//! request's options are merged over the configured defaults, and the API key
//! is appended. Requests without ZenRows options pass through untouched.
//!
//! On the way back it inspects provider error responses and logs the reason,
//! but never alters or swallows them.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::ZenRowsConfig;
use crate::error::ZenRowsError;
use crate::middleware::{Middleware, MiddlewareAction};
use crate::params::{ResolvedParams, ValidationWarning, ZenRowsParams};
use crate::request::Request;
use crate::response::Response;
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct ZenRowsMiddleware {
    config: Arc<ZenRowsConfig>,
}

impl ZenRowsMiddleware {
    pub fn new(config: Arc<ZenRowsConfig>) -> Self {
        let middleware = ZenRowsMiddleware { config };
        info!("Initializing ZenRowsMiddleware with config: {:?}", middleware.config);
        middleware
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ZenRowsError> {
        Ok(Self::new(Arc::new(ZenRowsConfig::from_settings(settings)?)))
    }

    pub fn config(&self) -> &ZenRowsConfig {
        &self.config
    }

    /// Builds the provider URL for `target` with the given per-request options.
    pub fn api_url(&self, target: &Url, params: &ZenRowsParams) -> (Url, Vec<ValidationWarning>) {
        let ResolvedParams { query, warnings } = params.resolve(self.config.defaults());

        let mut api_url = self.config.api_url().clone();
        {
            let mut pairs = api_url.query_pairs_mut();
            pairs.append_pair("url", target.as_str());
            for (name, value) in &query {
                pairs.append_pair(name, value);
            }
            pairs.append_pair("apikey", self.config.api_key());
        }

        (api_url, warnings)
    }

    /// Rewrites a proxied request in place and returns the validation warnings.
    ///
    /// Already rewritten requests (retries) are rebuilt from their original
    /// target, so adapting twice yields the same provider URL.
    pub fn adapt(&self, request: &mut Request) -> Vec<ValidationWarning> {
        let Some(params) = &request.params else {
            return Vec::new();
        };
        let (api_url, warnings) = self.api_url(request.target_url(), params);

        for warning in &warnings {
            warn!("{} (request to {})", warning, request.target_url());
        }
        debug!(
            "Routing {} through ZenRows: {}",
            request.target_url(),
            redact_api_key(&api_url)
        );

        request.rewrite(api_url);
        warnings
    }

    fn log_provider_error(&self, response: &Response, params: &ZenRowsParams) {
        let status = response.status.as_u16();
        if status < 400 {
            return;
        }

        let allowed = params
            .resolve(self.config.defaults())
            .allowed_status_codes();
        if allowed.contains(&status) {
            trace!("Status {} is in allowed_status_codes, passing through", status);
            return;
        }

        let target = response.request().target_url();
        if status == 401 {
            error!("Unauthorized: invalid ZenRows API key provided (request to {})", target);
            return;
        }

        let title = response
            .json::<Value>()
            .ok()
            .and_then(|body| body.get("title").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or_else(|| "Unknown Error".to_string());
        error!("ZenRows error {} for {}: {}", status, target, title);
    }
}

/// Replaces the value of the `apikey` query parameter with `***` for logging.
pub fn redact_api_key(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "apikey") {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "apikey" { "***".into() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();

    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

#[async_trait]
impl<C: Send + Sync> Middleware<C> for ZenRowsMiddleware {
    fn name(&self) -> &str {
        "ZenRowsMiddleware"
    }

    async fn process_request(
        &mut self,
        _client: &C,
        mut request: Request,
    ) -> Result<MiddlewareAction<Request>, ZenRowsError> {
        if !request.is_proxied() {
            trace!("{} is not a ZenRows request, passing through", request.url);
            return Ok(MiddlewareAction::Continue(request));
        }

        self.adapt(&mut request);
        Ok(MiddlewareAction::Continue(request))
    }

    async fn process_response(
        &mut self,
        response: Response,
    ) -> Result<MiddlewareAction<Response>, ZenRowsError> {
        if let Some(params) = &response.request().params {
            self.log_provider_error(&response, params);
        }
        Ok(MiddlewareAction::Continue(response))
    }
}
