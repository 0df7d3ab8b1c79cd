//! Immutable configuration shared by the ZenRows middlewares.
//!
//! A `ZenRowsConfig` is built once (from code, from a [`Settings`] table or from
//! a serialized file) and then shared as an `Arc` between
//! [`ZenRowsMiddleware`](crate::adapter::ZenRowsMiddleware) and
//! [`ZenRowsRetryMiddleware`](crate::retry::ZenRowsRetryMiddleware). Nothing
//! mutates it after construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Debug};
use url::Url;

use crate::error::ZenRowsError;
use crate::params::{ParamValue, ZenRowsParams, lookup};
use crate::settings::Settings;

pub const DEFAULT_API_URL: &str = "https://api.zenrows.com/v1/";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.0;
pub const DEFAULT_RETRY_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Retry settings. `max_attempts` counts every transmission, the first included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    /// Seconds; the delay before retry `n` is `backoff_factor * 2^(n-1)`.
    pub backoff_factor: f64,
    pub retry_status_codes: BTreeSet<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retry_status_codes: DEFAULT_RETRY_STATUS_CODES.into_iter().collect(),
        }
    }
}

#[derive(Clone, PartialEq, Deserialize)]
#[serde(try_from = "ZenRowsConfigBuilder")]
pub struct ZenRowsConfig {
    api_key: String,
    api_url: Url,
    defaults: ZenRowsParams,
    retry: RetryConfig,
}

impl Debug for ZenRowsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZenRowsConfig")
            .field("api_key", &"***")
            .field("api_url", &self.api_url.as_str())
            .field("defaults", &self.defaults)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ZenRowsConfig {
    /// Starts a builder for the given API key.
    pub fn builder(api_key: impl Into<String>) -> ZenRowsConfigBuilder {
        ZenRowsConfigBuilder {
            api_key: api_key.into(),
            ..ZenRowsConfigBuilder::default()
        }
    }

    /// Reads the `ZENROWS_*` settings table.
    ///
    /// Fails with [`ZenRowsError::NotConfigured`] when no API key is set and with
    /// [`ZenRowsError::Config`] when a value cannot be parsed.
    pub fn from_settings(settings: &Settings) -> Result<Self, ZenRowsError> {
        let api_key = settings.get("ZENROWS_API_KEY").ok_or_else(|| {
            ZenRowsError::NotConfigured("ZenRows API key is not configured".to_string())
        })?;
        let mut builder = ZenRowsConfig::builder(api_key);

        if let Some(raw) = settings.get("ZENROWS_API_URL") {
            builder = builder.api_url(Url::parse(raw)?);
        }

        for (key, param) in [
            ("USE_ZENROWS_PREMIUM_PROXY", "premium_proxy"),
            ("USE_ZENROWS_JS_RENDER", "js_render"),
            ("USE_ZENROWS_ORIGINAL_STATUS", "original_status"),
        ] {
            // A disabled toggle leaves the option unset rather than sending `false`.
            if settings.get_bool(key)? == Some(true) {
                builder = builder.default_param(param, true);
            }
        }
        if let Some(session_id) = settings.get_i64("ZENROWS_SESSION_ID")? {
            builder = builder.default_param("session_id", session_id);
        }
        for (key, param) in [
            ("ZENROWS_BLOCK_RESOURCES", "block_resources"),
            ("ZENROWS_ALLOWED_STATUS_CODES", "allowed_status_codes"),
        ] {
            if let Some(value) = settings.get(key) {
                builder = builder.default_param(param, value);
            }
        }

        if let Some(enabled) = settings.get_bool("ZENROWS_RETRY_ENABLED")? {
            builder = builder.retry_enabled(enabled);
        }
        if let Some(max_attempts) = settings.get_u32("ZENROWS_MAX_ATTEMPTS")? {
            builder = builder.max_attempts(max_attempts);
        }
        if let Some(factor) = settings.get_f64("ZENROWS_RETRY_BACKOFF")? {
            builder = builder.backoff_factor(factor);
        }
        if let Some(codes) = settings.get_list::<u16>("ZENROWS_RETRY_STATUS_CODES")? {
            builder = builder.retry_status_codes(codes);
        }

        builder.build()
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Options applied to every proxied request that does not set them itself.
    pub fn defaults(&self) -> &ZenRowsParams {
        &self.defaults
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

/// Builder for [`ZenRowsConfig`]. Also the on-disk shape of the configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ZenRowsConfigBuilder {
    api_key: String,
    api_url: Option<Url>,
    defaults: ZenRowsParams,
    retry: RetryConfig,
}

impl ZenRowsConfigBuilder {
    /// Overrides the provider endpoint.
    pub fn api_url(mut self, api_url: Url) -> Self {
        self.api_url = Some(api_url);
        self
    }

    /// Sets a global default for any allow-listed option.
    pub fn default_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.defaults.insert(name, value);
        self
    }

    pub fn premium_proxy(self, enabled: bool) -> Self {
        self.default_param("premium_proxy", enabled)
    }

    pub fn js_render(self, enabled: bool) -> Self {
        self.default_param("js_render", enabled)
    }

    pub fn original_status(self, enabled: bool) -> Self {
        self.default_param("original_status", enabled)
    }

    pub fn session_id(self, session_id: i64) -> Self {
        self.default_param("session_id", session_id)
    }

    pub fn block_resources(self, resources: impl Into<String>) -> Self {
        self.default_param("block_resources", resources.into())
    }

    pub fn allowed_status_codes(self, codes: impl Into<String>) -> Self {
        self.default_param("allowed_status_codes", codes.into())
    }

    pub fn retry_enabled(mut self, enabled: bool) -> Self {
        self.retry.enabled = enabled;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    pub fn backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.retry.backoff_factor = backoff_factor;
        self
    }

    pub fn retry_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retry.retry_status_codes = codes.into_iter().collect();
        self
    }

    pub fn build(self) -> Result<ZenRowsConfig, ZenRowsError> {
        if self.api_key.trim().is_empty() {
            return Err(ZenRowsError::NotConfigured(
                "ZenRows API key is not configured".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ZenRowsError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 0.0 {
            return Err(ZenRowsError::Config(format!(
                "backoff_factor must be a non-negative number, got {}",
                self.retry.backoff_factor
            )));
        }
        if let Some((name, _)) = self.defaults.iter().find(|(name, _)| lookup(name).is_none()) {
            return Err(ZenRowsError::Config(format!(
                "unknown ZenRows option `{}` in defaults",
                name
            )));
        }

        let api_url = match self.api_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_API_URL)?,
        };

        Ok(ZenRowsConfig {
            api_key: self.api_key,
            api_url,
            defaults: self.defaults,
            retry: self.retry,
        })
    }
}

impl TryFrom<ZenRowsConfigBuilder> for ZenRowsConfig {
    type Error = ZenRowsError;

    fn try_from(builder: ZenRowsConfigBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = ZenRowsConfig::builder("key").build().unwrap();

        assert_eq!(config.api_url().as_str(), DEFAULT_API_URL);
        assert!(config.defaults().is_empty());
        assert_eq!(config.retry().max_attempts, 3);
        assert_eq!(config.retry().backoff_factor, 1.0);
        assert_eq!(
            config.retry().retry_status_codes,
            BTreeSet::from([429, 500, 502, 503, 504])
        );
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        assert!(matches!(
            ZenRowsConfig::builder("  ").build(),
            Err(ZenRowsError::NotConfigured(_))
        ));
        assert!(matches!(
            ZenRowsConfig::from_settings(&Settings::new()),
            Err(ZenRowsError::NotConfigured(_))
        ));
    }

    #[test]
    fn rejects_bad_retry_settings() {
        assert!(ZenRowsConfig::builder("key").max_attempts(0).build().is_err());
        assert!(ZenRowsConfig::builder("key").backoff_factor(-1.0).build().is_err());
        assert!(ZenRowsConfig::builder("key").default_param("bogus", true).build().is_err());
    }

    #[test]
    fn from_settings_reads_every_key() {
        let settings = Settings::new()
            .with("ZENROWS_API_KEY", "secret")
            .with("ZENROWS_API_URL", "http://127.0.0.1:9000/v1/")
            .with("USE_ZENROWS_PREMIUM_PROXY", "true")
            .with("USE_ZENROWS_JS_RENDER", "false")
            .with("ZENROWS_SESSION_ID", 12345)
            .with("ZENROWS_BLOCK_RESOURCES", "image,font")
            .with("ZENROWS_ALLOWED_STATUS_CODES", "404,500")
            .with("ZENROWS_MAX_ATTEMPTS", 5)
            .with("ZENROWS_RETRY_BACKOFF", 2.0)
            .with("ZENROWS_RETRY_STATUS_CODES", "429,503");
        let config = ZenRowsConfig::from_settings(&settings).unwrap();

        assert_eq!(config.api_key(), "secret");
        assert_eq!(config.api_url().as_str(), "http://127.0.0.1:9000/v1/");
        assert_eq!(config.defaults().get("premium_proxy"), Some(&ParamValue::Bool(true)));
        assert!(!config.defaults().contains("js_render"));
        assert_eq!(config.defaults().get("session_id"), Some(&ParamValue::Int(12345)));
        assert_eq!(
            config.defaults().get("block_resources"),
            Some(&ParamValue::from("image,font"))
        );
        assert_eq!(config.retry().max_attempts, 5);
        assert_eq!(config.retry().backoff_factor, 2.0);
        assert_eq!(config.retry().retry_status_codes, BTreeSet::from([429, 503]));
    }

    #[test]
    fn empty_retry_status_codes_keep_defaults() {
        let settings = Settings::new()
            .with("ZENROWS_API_KEY", "secret")
            .with("ZENROWS_RETRY_STATUS_CODES", "");
        let config = ZenRowsConfig::from_settings(&settings).unwrap();

        assert_eq!(
            config.retry().retry_status_codes,
            BTreeSet::from(DEFAULT_RETRY_STATUS_CODES)
        );
    }

    #[test]
    fn deserialises_and_validates() {
        let config: ZenRowsConfig = serde_json::from_str(
            r#"{"api_key": "k", "defaults": {"js_render": true}, "retry": {"max_attempts": 4}}"#,
        )
        .unwrap();
        assert_eq!(config.retry().max_attempts, 4);
        assert_eq!(config.retry().backoff_factor, 1.0);
        assert_eq!(config.defaults().get("js_render"), Some(&ParamValue::Bool(true)));

        let missing_key = serde_json::from_str::<ZenRowsConfig>(r#"{"defaults": {}}"#);
        assert!(missing_key.is_err());
    }

    #[test]
    fn debug_masks_api_key() {
        let config = ZenRowsConfig::builder("super-secret").build().unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("***"));
    }
}
