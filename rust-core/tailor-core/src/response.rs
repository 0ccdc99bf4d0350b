//! # HTTP Response
//!
//! The response value threaded through handlers and filters.
//!
//! Header names are case-insensitive. `Content-Type` lives in its own field
//! and is written once when the response is converted for hyper.

use crate::session::Session;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use std::collections::HashMap;
use std::fmt::Write as _;

/// A cookie to set on the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Path scope
    pub path: String,
    /// Hide from scripts
    pub http_only: bool,
    /// Lifetime in seconds, session cookie when `None`
    pub max_age: Option<i64>,
}

impl Cookie {
    /// An HTTP-only cookie scoped to `/`
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            http_only: true,
            max_age: None,
        }
    }

    /// `Set-Cookie` header value
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let mut header = format!("{}={}; Path={}", self.name, self.value, self.path);
        if let Some(max_age) = self.max_age {
            let _ = write!(header, "; Max-Age={max_age}");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }
}

/// An HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Content type
    pub content_type: String,
    headers: HashMap<String, String>,
    /// Cookies to set
    pub cookies: Vec<Cookie>,
    /// Response body
    pub body: Vec<u8>,
    /// Replacement session, saved instead of the request's session
    pub session: Option<Session>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: "text/html".to_string(),
            headers: HashMap::new(),
            cookies: Vec::new(),
            body: Vec::new(),
            session: None,
        }
    }
}

impl Response {
    /// An empty 200 response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An HTML response
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            body: body.into().into_bytes(),
            ..Self::default()
        }
    }

    /// A plain text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::html(body).with_header("Content-Type", "text/plain")
    }

    /// A JSON response
    #[must_use]
    pub fn json(body: impl Into<String>) -> Self {
        Self::html(body).with_header("Content-Type", "application/json")
    }

    /// A 303 redirect to `url`
    #[must_use]
    pub fn redirect(url: &str) -> Self {
        let mut response = Self::new();
        response.set_redirect(url);
        response
    }

    /// Turn this response into a 303 redirect to `url`
    ///
    /// Headers and cookies already set are kept.
    pub fn set_redirect(&mut self, url: &str) {
        self.status = StatusCode::SEE_OTHER.as_u16();
        self.set_header("Location", url);
        self.set_body(format!(
            "<html><body>You are being <a href=\"{url}\">redirected</a>."
        ));
    }

    /// The 404 page
    #[must_use]
    pub fn not_found() -> Self {
        Self::html("File Not Found").with_status(StatusCode::NOT_FOUND.as_u16())
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        } else {
            self.headers
                .insert(name.to_ascii_lowercase(), value.to_string());
        }
    }

    /// Header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        if name.eq_ignore_ascii_case("content-type") {
            return Some(&self.content_type);
        }
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Remove a header, returning its value
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(&name.to_ascii_lowercase())
    }

    /// Headers other than `Content-Type`, with lower-case names
    #[must_use]
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Replace the body
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    /// Body as UTF-8 text
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Queue a cookie
    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.cookies.retain(|existing| existing.name != cookie.name);
        self.cookies.push(cookie);
    }

    /// Whether the status is 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Convert for hyper
    ///
    /// Unknown status codes and invalid header values degrade to a 500
    /// response rather than failing.
    #[must_use]
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = hyper::Response::builder()
            .status(status)
            .header("Content-Type", &self.content_type);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        for cookie in &self.cookies {
            builder = builder.header("Set-Cookie", cookie.to_header_value());
        }

        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|_| {
                let mut fallback =
                    hyper::Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}
