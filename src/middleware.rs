//! The downloader-middleware contract the ZenRows components plug into.
//!
//! A host crawler calls `process_request` on each registered middleware in
//! registration order before transmitting a request, `process_response` in
//! reverse order once a response arrives, and `handle_error` when the
//! transport fails. Each hook answers with a `MiddlewareAction` telling the
//! host how to proceed. A `Retry` action carries the delay as a scheduling
//! hint; middlewares never sleep themselves.

use async_trait::async_trait;
use std::any::Any;
use std::time::Duration;

use crate::error::ZenRowsError;
use crate::request::Request;
use crate::response::Response;

#[allow(clippy::large_enum_variant)]
/// Returned by middleware hooks to steer the host.
#[derive(Debug)]
pub enum MiddlewareAction<T> {
    /// Continue processing with the provided item.
    Continue(T),
    /// Reissue the request after the given delay. Only meaningful from
    /// `process_response` and `handle_error`.
    Retry(Box<Request>, Duration),
    /// Drop the item, stopping further processing.
    Drop,
    /// Short-circuit with a response instead of downloading. Only meaningful
    /// from `process_request`.
    ReturnResponse(Response),
}

#[async_trait]
pub trait Middleware<C: Send + Sync>: Any + Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn process_request(
        &mut self,
        _client: &C,
        request: Request,
    ) -> Result<MiddlewareAction<Request>, ZenRowsError> {
        Ok(MiddlewareAction::Continue(request))
    }

    async fn process_response(
        &mut self,
        response: Response,
    ) -> Result<MiddlewareAction<Response>, ZenRowsError> {
        Ok(MiddlewareAction::Continue(response))
    }

    async fn handle_error(
        &mut self,
        _request: &Request,
        error: &ZenRowsError,
    ) -> Result<MiddlewareAction<Request>, ZenRowsError> {
        Err(error.clone())
    }
}
