//! # Request Filters
//!
//! Policies that run around a route handler.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Each filter enforces one policy
//! - **O**: New policies implement `RequestFilter`, the chain is unchanged
//! - **D**: The server depends on the trait, not on concrete filters
//!
//! A [`FilterChain`] walks its filters in order calling `pre_process`. A filter
//! that answers [`FilterResult::Stop`] ends the walk and the handler is never
//! called. Afterwards `post_process` runs in reverse order, but only for the
//! filters whose `pre_process` ran, including the one that stopped.

mod auth;
mod csrf;
mod etag;

pub use auth::{AuthenticationFilter, TableUserLookup, UserLookup, REDIRECT_PATH_KEY, USER_ID_KEY};
pub use csrf::{CsrfFilter, CSRF_DENIAL_MESSAGE, CSRF_PARAMETER, CSRF_SESSION_KEY};
pub use etag::{content_tag, EtagFilter};

use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Future returned by a route handler, borrowing the request
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Response> + Send + 'a>>;

/// Outcome of a filter's `pre_process`
#[derive(Debug)]
pub enum FilterResult {
    /// Go on to the next filter, then the handler
    Continue(Request, Response),
    /// Skip the rest of the chain and the handler
    Stop(Request, Response),
}

impl FilterResult {
    /// Whether processing stops here
    #[must_use]
    pub const fn is_stop(&self) -> bool {
        matches!(self, Self::Stop(..))
    }

    /// The request and response carried by either outcome
    #[must_use]
    pub fn into_parts(self) -> (Request, Response) {
        match self {
            Self::Continue(request, response) | Self::Stop(request, response) => {
                (request, response)
            }
        }
    }
}

/// A policy applied before and after a handler
///
/// Expected outcomes such as a missing token are written into the response
/// and signalled with [`FilterResult::Stop`], never returned as errors.
#[async_trait]
pub trait RequestFilter: Send + Sync {
    /// Inspect or replace the request and response before the handler
    async fn pre_process(&self, request: Request, response: Response) -> FilterResult {
        FilterResult::Continue(request, response)
    }

    /// Transform the response after the handler
    async fn post_process(&self, _request: &Request, response: Response) -> Response {
        response
    }

    /// Filter name, used for logging and [`FilterChain::without`]
    fn name(&self) -> &'static str;
}

/// An ordered, shareable pipeline of filters
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn RequestFilter>>,
}

impl FilterChain {
    /// An empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter
    pub fn add<F: RequestFilter + 'static>(&mut self, filter: F) {
        self.filters.push(Arc::new(filter));
    }

    /// Append a shared filter
    pub fn add_shared(&mut self, filter: Arc<dyn RequestFilter>) {
        self.filters.push(filter);
    }

    /// Builder form of [`FilterChain::add`]
    #[must_use]
    pub fn with<F: RequestFilter + 'static>(mut self, filter: F) -> Self {
        self.add(filter);
        self
    }

    /// A copy of this chain without the filters named `name`
    #[must_use]
    pub fn without(&self, name: &str) -> Self {
        Self {
            filters: self
                .filters
                .iter()
                .filter(|filter| filter.name() != name)
                .cloned()
                .collect(),
        }
    }

    /// Append every filter of `other`
    #[must_use]
    pub fn extend(mut self, other: &Self) -> Self {
        self.filters.extend(other.filters.iter().cloned());
        self
    }

    /// Filter names in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|filter| filter.name()).collect()
    }

    /// Number of filters
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain has no filters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run the chain around `handler`
    ///
    /// Returns the request as the filters left it, so session changes made
    /// by filters can be persisted, together with the final response.
    pub async fn process<H>(&self, request: Request, handler: H) -> (Request, Response)
    where
        H: for<'a> FnOnce(&'a Request, Response) -> HandlerFuture<'a> + Send,
    {
        let mut request = request;
        let mut response = Response::new();
        let mut ran = 0;
        let mut stopped = false;

        for filter in &self.filters {
            ran += 1;
            let result = filter.pre_process(request, response).await;
            stopped = result.is_stop();
            (request, response) = result.into_parts();
            if stopped {
                debug!(filter = filter.name(), path = %request.path, "Filter stopped request");
                break;
            }
        }

        if !stopped {
            response = handler(&request, response).await;
        }

        for filter in self.filters[..ran].iter().rev() {
            response = filter.post_process(&request, response).await;
        }

        (request, response)
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        stop: bool,
        log: Log,
    }

    #[async_trait]
    impl RequestFilter for Recording {
        async fn pre_process(&self, request: Request, response: Response) -> FilterResult {
            self.log.lock().unwrap().push(format!("pre {}", self.name));
            if self.stop {
                FilterResult::Stop(request, Response::html("stopped").with_status(403))
            } else {
                FilterResult::Continue(request, response)
            }
        }

        async fn post_process(&self, _request: &Request, response: Response) -> Response {
            self.log.lock().unwrap().push(format!("post {}", self.name));
            response
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn recording(name: &'static str, stop: bool, log: &Log) -> Recording {
        Recording {
            name,
            stop,
            log: Arc::clone(log),
        }
    }

    fn hello(_request: &Request, _response: Response) -> HandlerFuture<'_> {
        Box::pin(async { Response::html("Hello") })
    }

    #[tokio::test]
    async fn test_handler_runs_between_filters() {
        let log = Log::default();
        let chain = FilterChain::new()
            .with(recording("a", false, &log))
            .with(recording("b", false, &log));

        let (_, response) = chain.process(Request::get("/"), hello).await;

        assert_eq!(response.body_str(), Some("Hello"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["pre a", "pre b", "post b", "post a"]
        );
    }

    #[tokio::test]
    async fn test_stop_skips_handler_and_later_filters() {
        let log = Log::default();
        let chain = FilterChain::new()
            .with(recording("a", false, &log))
            .with(recording("b", true, &log))
            .with(recording("c", false, &log));

        let handler_log = Arc::clone(&log);
        let (_, response) = chain
            .process(Request::get("/"), move |_request, response| {
                handler_log.lock().unwrap().push("handler".to_string());
                Box::pin(async move { response })
            })
            .await;

        assert_eq!(response.status, 403);
        assert_eq!(response.body_str(), Some("stopped"));
        assert_eq!(*log.lock().unwrap(), vec!["pre a", "pre b", "post b", "post a"]);
    }

    struct FrameOptions;

    #[async_trait]
    impl RequestFilter for FrameOptions {
        async fn pre_process(&self, request: Request, response: Response) -> FilterResult {
            FilterResult::Continue(request, response.with_header("X-Frame-Options", "DENY"))
        }

        fn name(&self) -> &'static str {
            "FrameOptions"
        }
    }

    struct NoUsers;

    #[async_trait]
    impl UserLookup for NoUsers {
        async fn user_exists(&self, _id: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_csrf_denial_keeps_earlier_headers() {
        let chain = FilterChain::new().with(FrameOptions).with(CsrfFilter::new());

        let (_, response) = chain
            .process(Request::post_form("/hats", "hat[color]=red"), hello)
            .await;

        assert_eq!(response.status, 403);
        assert_eq!(response.body_str(), Some(CSRF_DENIAL_MESSAGE));
        assert_eq!(response.header("X-Frame-Options"), Some("DENY"));
    }

    #[tokio::test]
    async fn test_auth_redirect_keeps_earlier_headers() {
        let chain = FilterChain::new()
            .with(FrameOptions)
            .with(AuthenticationFilter::new(Arc::new(NoUsers), "/sessions/new"));

        let (request, response) = chain.process(Request::get("/hats"), hello).await;

        assert_eq!(response.status, 303);
        assert_eq!(response.header("Location"), Some("/sessions/new"));
        assert_eq!(response.header("X-Frame-Options"), Some("DENY"));
        assert_eq!(request.session.get(REDIRECT_PATH_KEY), Some("/hats"));
    }

    #[tokio::test]
    async fn test_empty_chain_calls_handler() {
        let (request, response) = FilterChain::new().process(Request::get("/hats"), hello).await;
        assert_eq!(request.path, "/hats");
        assert_eq!(response.status, 200);
    }

    #[test]
    fn test_without_and_extend() {
        let log = Log::default();
        let chain = FilterChain::new()
            .with(recording("a", false, &log))
            .with(recording("b", false, &log));

        let trimmed = chain.without("a");
        assert_eq!(trimmed.names(), vec!["b"]);
        assert_eq!(chain.len(), 2);

        let combined = trimmed.extend(&chain);
        assert_eq!(combined.names(), vec!["b", "a", "b"]);
        assert!(FilterChain::new().is_empty());
    }

    #[test]
    fn test_filter_result_parts() {
        let result = FilterResult::Stop(Request::get("/"), Response::new());
        assert!(result.is_stop());
        let (request, _) = result.into_parts();
        assert_eq!(request.path, "/");
    }
}
