//! Provider options attached to a proxied request.
//!
//! The ZenRows API takes its feature switches as query parameters. This module
//! holds the allow-list of parameters the adapter knows how to forward, the
//! typed value a caller can attach to a request, and the validation that runs
//! when a request is rewritten. Validation never fails a request: problems are
//! reported as [`ValidationWarning`]s and the provider stays the final arbiter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

/// A single option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ParamValue {
    /// Reads the value as a flag. Accepts booleans, `"true"`/`"false"` in any
    /// case, and integers (non-zero is `true`).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Int(i) => Some(*i != 0),
            ParamValue::Text(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }

    /// Reads the value as an integer. Numeric strings are accepted.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Text(s) => s.trim().parse().ok(),
            ParamValue::Bool(_) => None,
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, ParamValue::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// How a parameter's value is interpreted and serialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Serialised as the literal `true` / `false`.
    Flag,
    /// Serialised as a decimal integer; values outside the range are warned about.
    Integer(RangeInclusive<i64>),
    /// Forwarded as-is.
    Text,
}

/// One row of the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// Flag that must be enabled for this parameter to have an effect.
    pub requires: Option<&'static str>,
}

const fn spec(name: &'static str, kind: ParamKind, requires: Option<&'static str>) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        requires,
    }
}

/// Every parameter the adapter forwards, in the order global defaults are emitted.
pub static ALLOWED_PARAMS: &[ParamSpec] = &[
    spec("js_render", ParamKind::Flag, None),
    spec("premium_proxy", ParamKind::Flag, None),
    spec("proxy_country", ParamKind::Text, None),
    spec("proxy_city", ParamKind::Text, Some("premium_proxy")),
    spec("session_id", ParamKind::Integer(1..=99_999), None),
    spec("wait", ParamKind::Integer(0..=30_000), Some("js_render")),
    spec("wait_for", ParamKind::Text, Some("js_render")),
    spec("block_resources", ParamKind::Text, None),
    spec("js_instructions", ParamKind::Text, Some("js_render")),
    spec("autoparse", ParamKind::Flag, None),
    spec("css_extractor", ParamKind::Text, None),
    spec("outputs", ParamKind::Text, None),
    spec("response_type", ParamKind::Text, None),
    spec("json_response", ParamKind::Flag, Some("js_render")),
    spec("screenshot", ParamKind::Flag, Some("js_render")),
    spec("screenshot_fullpage", ParamKind::Flag, Some("js_render")),
    spec("screenshot_selector", ParamKind::Text, Some("js_render")),
    spec("screenshot_format", ParamKind::Text, None),
    spec("screenshot_quality", ParamKind::Integer(1..=100), None),
    spec("original_status", ParamKind::Flag, None),
    spec("allowed_status_codes", ParamKind::Text, None),
    spec("custom_headers", ParamKind::Flag, None),
];

/// Pairs of parameters that may not both be active.
pub static MUTUALLY_EXCLUSIVE: &[(&str, &str)] = &[("screenshot_selector", "screenshot_fullpage")];

/// Looks up a parameter in the allow-list.
pub fn lookup(name: &str) -> Option<&'static ParamSpec> {
    ALLOWED_PARAMS.iter().find(|spec| spec.name == name)
}

/// A non-fatal problem found while adapting a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationWarning {
    #[error("unknown ZenRows option `{name}` dropped")]
    UnknownOption { name: String },
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("{name} must be an integer, got {value:?}")]
    NotAnInteger { name: &'static str, value: String },
    #[error("{name} must be true or false, got {value:?}")]
    NotABoolean { name: &'static str, value: String },
    #[error("{first} and {second} are mutually exclusive")]
    MutuallyExclusive {
        first: &'static str,
        second: &'static str,
    },
    #[error("{name} requires {requires}=true")]
    MissingPrerequisite {
        name: &'static str,
        requires: &'static str,
    },
}

/// Ordered option mapping attached to a single request (or used as global defaults).
///
/// Insertion order is kept so the rewritten query string follows the order the
/// caller supplied options in. Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, ParamValue>", into = "BTreeMap<String, ParamValue>")]
pub struct ZenRowsParams {
    entries: Vec<(String, ParamValue)>,
}

impl ZenRowsParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        let index = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks this mapping on its own, without global defaults.
    pub fn validate(&self) -> Vec<ValidationWarning> {
        self.resolve(&ZenRowsParams::default()).warnings
    }

    /// Merges `self` over `defaults`, serialises every allow-listed value and
    /// collects the warnings produced along the way.
    ///
    /// Per-request values come first in insertion order, followed by defaults
    /// the request did not override, in allow-list order.
    pub fn resolve(&self, defaults: &ZenRowsParams) -> ResolvedParams {
        let mut warnings = Vec::new();
        let mut effective: Vec<(&'static ParamSpec, &ParamValue)> = Vec::new();

        for (name, value) in self.iter() {
            match lookup(name) {
                Some(spec) => effective.push((spec, value)),
                None => warnings.push(ValidationWarning::UnknownOption {
                    name: name.to_string(),
                }),
            }
        }
        for spec in ALLOWED_PARAMS {
            if self.contains(spec.name) {
                continue;
            }
            if let Some(value) = defaults.get(spec.name) {
                effective.push((spec, value));
            }
        }

        let mut query = Vec::with_capacity(effective.len());
        for (spec, value) in &effective {
            query.push((spec.name, encode(spec, value, &mut warnings)));
        }

        let flag = |name: &str| {
            effective
                .iter()
                .find(|(spec, _)| spec.name == name)
                .and_then(|(_, value)| value.as_bool())
                .unwrap_or(false)
        };
        let active = |spec: &ParamSpec, value: &ParamValue| match spec.kind {
            ParamKind::Flag => value.as_bool().unwrap_or(false),
            _ => !value.is_blank(),
        };

        for &(first, second) in MUTUALLY_EXCLUSIVE {
            let both = [first, second].iter().all(|name| {
                effective
                    .iter()
                    .any(|&(spec, value)| spec.name == *name && active(spec, value))
            });
            if both {
                warnings.push(ValidationWarning::MutuallyExclusive { first, second });
            }
        }

        for (spec, value) in &effective {
            if let Some(requires) = spec.requires
                && active(*spec, *value)
                && !flag(requires)
            {
                warnings.push(ValidationWarning::MissingPrerequisite {
                    name: spec.name,
                    requires,
                });
            }
        }

        ResolvedParams { query, warnings }
    }
}

fn encode(spec: &ParamSpec, value: &ParamValue, warnings: &mut Vec<ValidationWarning>) -> String {
    match &spec.kind {
        ParamKind::Flag => match value.as_bool() {
            Some(b) => b.to_string(),
            None => {
                warnings.push(ValidationWarning::NotABoolean {
                    name: spec.name,
                    value: value.to_string(),
                });
                value.to_string()
            }
        },
        ParamKind::Integer(range) => match value.as_int() {
            Some(i) => {
                if !range.contains(&i) {
                    warnings.push(ValidationWarning::OutOfRange {
                        name: spec.name,
                        value: i,
                        min: *range.start(),
                        max: *range.end(),
                    });
                }
                i.to_string()
            }
            None => {
                warnings.push(ValidationWarning::NotAnInteger {
                    name: spec.name,
                    value: value.to_string(),
                });
                value.to_string()
            }
        },
        ParamKind::Text => value.to_string(),
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ZenRowsParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = ZenRowsParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl From<BTreeMap<String, ParamValue>> for ZenRowsParams {
    fn from(map: BTreeMap<String, ParamValue>) -> Self {
        map.into_iter().collect()
    }
}

impl From<ZenRowsParams> for BTreeMap<String, ParamValue> {
    fn from(params: ZenRowsParams) -> Self {
        params.entries.into_iter().collect()
    }
}

/// Output of [`ZenRowsParams::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedParams {
    /// Serialised query pairs, in emission order.
    pub query: Vec<(&'static str, String)>,
    pub warnings: Vec<ValidationWarning>,
}

impl ResolvedParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Status codes the caller asked the provider to pass through, parsed from
    /// the comma-separated `allowed_status_codes` option.
    pub fn allowed_status_codes(&self) -> Vec<u16> {
        self.get("allowed_status_codes")
            .map(|codes| {
                codes
                    .split(',')
                    .filter_map(|code| code.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}
