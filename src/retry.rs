//! Retry middleware for ZenRows requests.
//!
//! `RetryPolicy` holds the decision logic: a proxied request whose response
//! status is in the retriable set, or whose transport failed outright, is
//! reissued until it has been sent `max_attempts` times. The delay before
//! retry `n` is `backoff_factor * 2^(n-1)` seconds with no jitter. The delay is
//! handed back to the host as part of `MiddlewareAction::Retry`; nothing here
//! sleeps.
//!
//! `ZenRowsRetryMiddleware` wires the policy into the middleware chain. Once
//! the ceiling is reached the last response (or error) is surfaced to the host
//! unchanged.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, trace, warn};

use crate::config::{RetryConfig, ZenRowsConfig};
use crate::error::ZenRowsError;
use crate::middleware::{Middleware, MiddlewareAction};
use crate::request::Request;
use crate::response::Response;
use crate::settings::Settings;

/// Where a request stands in its retry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    FirstAttempt,
    Retrying,
    /// The ceiling was reached; the last outcome is final.
    Exhausted,
    /// The outcome was not retriable and is final.
    Done,
}

impl RetryState {
    /// State of a request that is about to be sent.
    pub fn of(request: &Request) -> Self {
        if request.attempt() <= 1 {
            RetryState::FirstAttempt
        } else {
            RetryState::Retrying
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    RetriableStatus(u16),
    TransportFailure,
    NonRetriableStatus(u16),
    NonRetriableError,
    NotProxied,
    DontRetry,
    Exhausted { attempts: u32 },
}

/// Outcome of evaluating one response or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
    pub reason: RetryReason,
}

impl RetryDecision {
    fn retry(delay: Duration, reason: RetryReason) -> Self {
        Self {
            retry: true,
            delay,
            reason,
        }
    }

    fn stop(reason: RetryReason) -> Self {
        Self {
            retry: false,
            delay: Duration::ZERO,
            reason,
        }
    }

    /// State the request moves into after this decision.
    pub fn state(&self) -> RetryState {
        match self.reason {
            _ if self.retry => RetryState::Retrying,
            RetryReason::Exhausted { .. } => RetryState::Exhausted,
            _ => RetryState::Done,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub retry_status_codes: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_factor: config.backoff_factor,
            retry_status_codes: config.retry_status_codes.clone(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `n` (1-based): `backoff_factor * 2^(n-1)`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.backoff_factor * 2.0f64.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    pub fn is_retriable_status(&self, status: u16) -> bool {
        self.retry_status_codes.contains(&status)
    }

    /// Decides what to do with a response to `request`.
    pub fn decide_status(&self, request: &Request, status: u16) -> RetryDecision {
        if let Some(decision) = self.skip(request) {
            return decision;
        }
        if !self.is_retriable_status(status) {
            return RetryDecision::stop(RetryReason::NonRetriableStatus(status));
        }
        self.next_attempt(request, RetryReason::RetriableStatus(status))
    }

    /// Decides what to do when sending `request` failed with `error`.
    pub fn decide_error(&self, request: &Request, error: &ZenRowsError) -> RetryDecision {
        if let Some(decision) = self.skip(request) {
            return decision;
        }
        if !error.is_transport() {
            return RetryDecision::stop(RetryReason::NonRetriableError);
        }
        self.next_attempt(request, RetryReason::TransportFailure)
    }

    fn skip(&self, request: &Request) -> Option<RetryDecision> {
        if !request.is_proxied() {
            return Some(RetryDecision::stop(RetryReason::NotProxied));
        }
        if request.dont_retry() {
            return Some(RetryDecision::stop(RetryReason::DontRetry));
        }
        None
    }

    fn next_attempt(&self, request: &Request, reason: RetryReason) -> RetryDecision {
        let attempt = request.attempt();
        if attempt < self.max_attempts {
            RetryDecision::retry(self.backoff_delay(attempt), reason)
        } else {
            RetryDecision::stop(RetryReason::Exhausted { attempts: attempt })
        }
    }
}

/// Middleware that retries proxied requests according to a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct ZenRowsRetryMiddleware {
    policy: RetryPolicy,
}

impl ZenRowsRetryMiddleware {
    /// Fails with [`ZenRowsError::NotConfigured`] when retries are disabled.
    pub fn new(config: Arc<ZenRowsConfig>) -> Result<Self, ZenRowsError> {
        if !config.retry().enabled {
            return Err(ZenRowsError::NotConfigured(
                "ZenRows retry middleware is disabled".to_string(),
            ));
        }
        Ok(Self::with_policy(RetryPolicy::from(config.retry())))
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ZenRowsError> {
        Self::new(Arc::new(ZenRowsConfig::from_settings(settings)?))
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        let middleware = ZenRowsRetryMiddleware { policy };
        info!("Initializing ZenRowsRetryMiddleware with config: {:?}", middleware.policy);
        middleware
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn reissue(request: &Request) -> Box<Request> {
        let mut next = request.clone();
        next.increment_attempt();
        Box::new(next)
    }
}

#[async_trait]
impl<C: Send + Sync> Middleware<C> for ZenRowsRetryMiddleware {
    fn name(&self) -> &str {
        "ZenRowsRetryMiddleware"
    }

    async fn process_response(
        &mut self,
        response: Response,
    ) -> Result<MiddlewareAction<Response>, ZenRowsError> {
        let request = response.request();
        trace!(
            "Processing response for {} with status: {}",
            request.target_url(),
            response.status
        );

        let decision = self.policy.decide_status(request, response.status.as_u16());
        if decision.retry {
            warn!(
                "ZenRows request to {} failed with status {}. Retrying in {:?} (attempt {}/{})",
                request.target_url(),
                response.status,
                decision.delay,
                request.attempt() + 1,
                self.policy.max_attempts
            );
            return Ok(MiddlewareAction::Retry(Self::reissue(request), decision.delay));
        }

        if let RetryReason::Exhausted { attempts } = decision.reason {
            error!(
                "ZenRows request to {} failed after {} attempts. Status: {}",
                request.target_url(),
                attempts,
                response.status
            );
        } else {
            trace!("No retry for {}: {:?}", request.target_url(), decision.reason);
        }
        Ok(MiddlewareAction::Continue(response))
    }

    async fn handle_error(
        &mut self,
        request: &Request,
        error: &ZenRowsError,
    ) -> Result<MiddlewareAction<Request>, ZenRowsError> {
        trace!("Handling error for request {}: {}", request.target_url(), error);

        let decision = self.policy.decide_error(request, error);
        if decision.retry {
            warn!(
                "ZenRows request to {} failed with {}. Retrying in {:?} (attempt {}/{})",
                request.target_url(),
                error,
                decision.delay,
                request.attempt() + 1,
                self.policy.max_attempts
            );
            return Ok(MiddlewareAction::Retry(Self::reissue(request), decision.delay));
        }

        if let RetryReason::Exhausted { attempts } = decision.reason {
            error!(
                "ZenRows request to {} failed after {} attempts. Error: {}",
                request.target_url(),
                attempts,
                error
            );
        }
        Err(error.clone())
    }
}
