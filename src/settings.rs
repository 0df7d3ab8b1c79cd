//! Process-wide settings keyed by name.
//!
//! Host frameworks usually expose their configuration as a flat name/value
//! table (`ZENROWS_API_KEY`, `ZENROWS_MAX_ATTEMPTS`, ...). `Settings` holds such
//! a table and offers typed getters; [`ZenRowsConfig::from_settings`] turns it
//! into the immutable configuration the middlewares are built from.
//!
//! [`ZenRowsConfig::from_settings`]: crate::config::ZenRowsConfig::from_settings

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::ZenRowsError;

/// Prefixes of environment variables picked up by [`Settings::from_env`].
const ENV_PREFIXES: &[&str] = &["ZENROWS_", "USE_ZENROWS_"];

#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects every `ZENROWS_*` and `USE_ZENROWS_*` environment variable.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Keeps the `ZENROWS_*` and `USE_ZENROWS_*` entries of a variable listing.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        vars.into_iter()
            .filter(|(key, _)| ENV_PREFIXES.iter().any(|prefix| key.starts_with(prefix)))
            .collect()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Raw value. Empty strings count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ZenRowsError> {
        self.get(key)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(invalid(key, raw, "a boolean")),
            })
            .transpose()
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>, ZenRowsError> {
        self.parsed(key, "an unsigned integer")
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, ZenRowsError> {
        self.parsed(key, "an integer")
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, ZenRowsError> {
        self.parsed(key, "a number")
    }

    /// Comma-separated list, blank items skipped.
    /// Comma-separated list. An empty value counts as unset.
    pub fn get_list<T: FromStr>(&self, key: &str) -> Result<Option<Vec<T>>, ZenRowsError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| item.parse().map_err(|_| invalid(key, item, "a list item")))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn parsed<T: FromStr>(&self, key: &str, expected: &str) -> Result<Option<T>, ZenRowsError> {
        self.get(key)
            .map(|raw| raw.parse().map_err(|_| invalid(key, raw, expected)))
            .transpose()
    }
}

fn invalid(key: &str, raw: &str, expected: &str) -> ZenRowsError {
    ZenRowsError::Config(format!("{} must be {}, got {:?}", key, expected, raw))
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
