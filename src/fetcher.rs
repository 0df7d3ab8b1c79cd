//! Single-request driver for a middleware chain.
//!
//! `Fetcher` plays the host's part for one request: it runs `process_request`
//! in registration order, downloads, then runs `process_response` (or
//! `handle_error`) in reverse order and follows whatever `MiddlewareAction`
//! comes back. `Retry` delays are honoured with `tokio::time::sleep`, so the
//! wait happens here and never inside a middleware.
//!
//! Register the retry middleware before the adapter so that responses reach
//! the adapter first and the retry decision last:
//!
//! ```rust,ignore
//! let config = Arc::new(ZenRowsConfig::from_settings(&Settings::from_env())?);
//! let mut fetcher = Fetcher::new(ReqwestDownloader::new()?)
//!     .add_middleware(ZenRowsRetryMiddleware::new(config.clone())?)
//!     .add_middleware(ZenRowsMiddleware::new(config));
//!
//! let request = Request::parse_zenrows("https://example.com")?.with_param("js_render", true);
//! let response = fetcher.fetch(request).await?;
//! ```

use std::time::Duration;
use tracing::{debug, trace};

use crate::downloader::Downloader;
use crate::error::ZenRowsError;
use crate::middleware::{Middleware, MiddlewareAction};
use crate::request::Request;
use crate::response::Response;

enum Step {
    Send(Request),
    Finish(Option<Response>),
    Retry(Request, Duration),
}

pub struct Fetcher<D: Downloader> {
    downloader: D,
    middlewares: Vec<Box<dyn Middleware<D::Client>>>,
}

impl<D: Downloader> Fetcher<D> {
    pub fn new(downloader: D) -> Self {
        Self {
            downloader,
            middlewares: Vec::new(),
        }
    }

    pub fn add_middleware(mut self, middleware: impl Middleware<D::Client>) -> Self {
        debug!("Registered middleware {}", middleware.name());
        self.middlewares.push(Box::new(middleware));
        self
    }

    pub fn downloader(&self) -> &D {
        &self.downloader
    }

    /// Drives `request` to a terminal outcome.
    ///
    /// Returns `Ok(None)` when a middleware dropped the request or response,
    /// and the transport error when no middleware recovered from it.
    pub async fn fetch(&mut self, mut request: Request) -> Result<Option<Response>, ZenRowsError> {
        loop {
            let outgoing = match self.run_request_phase(request).await? {
                Step::Send(outgoing) => outgoing,
                Step::Finish(response) => return Ok(response),
                Step::Retry(next, delay) => {
                    request = self.wait(next, delay).await;
                    continue;
                }
            };

            let step = match self.downloader.download(&outgoing).await {
                Ok(response) => self.run_response_phase(response).await?,
                Err(error) => self.run_error_phase(&outgoing, error).await?,
            };
            match step {
                Step::Finish(response) => return Ok(response),
                Step::Retry(next, delay) => request = self.wait(next, delay).await,
                Step::Send(next) => request = next,
            }
        }
    }

    async fn wait(&self, request: Request, delay: Duration) -> Request {
        trace!("Waiting {:?} before reissuing {}", delay, request.target_url());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        request
    }

    async fn run_request_phase(&mut self, mut request: Request) -> Result<Step, ZenRowsError> {
        let client = self.downloader.client();
        for middleware in self.middlewares.iter_mut() {
            request = match middleware.process_request(client, request).await? {
                MiddlewareAction::Continue(request) => request,
                MiddlewareAction::Drop => return Ok(Step::Finish(None)),
                MiddlewareAction::ReturnResponse(response) => {
                    return Ok(Step::Finish(Some(response)));
                }
                MiddlewareAction::Retry(request, delay) => return Ok(Step::Retry(*request, delay)),
            };
        }
        Ok(Step::Send(request))
    }

    async fn run_response_phase(&mut self, mut response: Response) -> Result<Step, ZenRowsError> {
        for middleware in self.middlewares.iter_mut().rev() {
            response = match middleware.process_response(response).await? {
                MiddlewareAction::Continue(response) => response,
                MiddlewareAction::ReturnResponse(response) => response,
                MiddlewareAction::Drop => return Ok(Step::Finish(None)),
                MiddlewareAction::Retry(request, delay) => return Ok(Step::Retry(*request, delay)),
            };
        }
        Ok(Step::Finish(Some(response)))
    }

    async fn run_error_phase(
        &mut self,
        request: &Request,
        mut error: ZenRowsError,
    ) -> Result<Step, ZenRowsError> {
        for middleware in self.middlewares.iter_mut().rev() {
            match middleware.handle_error(request, &error).await {
                Ok(MiddlewareAction::Continue(request)) => return Ok(Step::Send(request)),
                Ok(MiddlewareAction::Retry(request, delay)) => {
                    return Ok(Step::Retry(*request, delay));
                }
                Ok(MiddlewareAction::Drop) => return Ok(Step::Finish(None)),
                Ok(MiddlewareAction::ReturnResponse(response)) => {
                    return Ok(Step::Finish(Some(response)));
                }
                Err(passed_on) => error = passed_on,
            }
        }
        Err(error)
    }
}
