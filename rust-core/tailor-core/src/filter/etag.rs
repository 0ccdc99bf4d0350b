//! Conditional GET support through content hashes.

use super::RequestFilter;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use hyper::header::{ETAG, IF_NONE_MATCH};
use md5::{Digest, Md5};
use std::fmt::Write as _;
use tracing::debug;

/// Lower-case hex MD5 of a response body
#[must_use]
pub fn content_tag(body: &[u8]) -> String {
    let digest = Md5::digest(body);
    let mut tag = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(tag, "{byte:02x}");
    }
    tag
}

/// Tags successful responses and answers matching conditional requests
/// with `304 Not Modified`
#[derive(Debug, Clone, Copy, Default)]
pub struct EtagFilter;

impl EtagFilter {
    /// Create the filter
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RequestFilter for EtagFilter {
    async fn post_process(&self, request: &Request, mut response: Response) -> Response {
        if response.status != 200 {
            return response;
        }

        let tag = content_tag(&response.body);
        response.set_header(ETAG.as_str(), &tag);

        if request.header(IF_NONE_MATCH.as_str()) == Some(tag.as_str()) {
            debug!(path = %request.path, "Content unchanged, answering 304");
            response.status = 304;
            response.body.clear();
        }
        response
    }

    fn name(&self) -> &'static str {
        "EtagFilter"
    }
}
