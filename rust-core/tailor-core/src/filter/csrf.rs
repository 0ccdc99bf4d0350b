//! Cross-site request forgery protection.

use super::{FilterResult, RequestFilter};
use crate::request::Request;
use crate::response::Response;
use crate::session::random_token;
use async_trait::async_trait;
use tracing::{error, warn};

/// Session key holding the client's token
pub const CSRF_SESSION_KEY: &str = "csrfKey";

/// Request parameter a form submits the token in
pub const CSRF_PARAMETER: &str = "_csrfKey";

/// Body of the denial response
pub const CSRF_DENIAL_MESSAGE: &str =
    "That action cannot be completed because of a security restriction.";

/// Rejects state-changing requests that do not echo the session's token
///
/// Every request leaves with a token in its session, so pages rendered for
/// safe requests can embed it in their forms. GET, HEAD and OPTIONS are
/// exempt from the check, where earlier Tailor releases exempted only GET.
///
/// A denial keeps whatever headers and cookies earlier filters set on the
/// response.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsrfFilter;

impl CsrfFilter {
    /// Create the filter
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RequestFilter for CsrfFilter {
    async fn pre_process(&self, mut request: Request, mut response: Response) -> FilterResult {
        let token = if let Some(token) = request.session.get(CSRF_SESSION_KEY) {
            token.to_string()
        } else {
            match random_token() {
                Ok(token) => {
                    request.session.set(CSRF_SESSION_KEY, token.clone());
                    token
                }
                Err(e) => {
                    error!(error = %e, "Could not generate CSRF token");
                    response.status = 500;
                    response.set_body("Internal Server Error");
                    return FilterResult::Stop(request, response);
                }
            }
        };

        if request.method.is_safe() || request.param(CSRF_PARAMETER) == Some(token.as_str()) {
            return FilterResult::Continue(request, response);
        }

        warn!(
            method = %request.method,
            path = %request.path,
            filter = self.name(),
            "Rejected request with missing or mismatched CSRF token"
        );
        response.status = 403;
        response.set_body(CSRF_DENIAL_MESSAGE);
        FilterResult::Stop(request, response)
    }

    fn name(&self) -> &'static str {
        "CsrfFilter"
    }
}
