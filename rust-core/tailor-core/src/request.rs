//! # HTTP Request
//!
//! The request value that flows through the filter pipeline.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Request only carries what the client sent plus its session
//! - **D**: Filters and handlers never see hyper types
//!
//! Parameters come from three places and are merged in a fixed order:
//! query string, then body (form-encoded or JSON), then path parameters.
//! A later source wins when names collide.

use crate::error::{Error, Result};
use crate::json::json_body_params;
use crate::router::Method;
use crate::session::Session;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use std::collections::HashMap;
use tracing::debug;

/// An HTTP request
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path without the query string
    pub path: String,
    query_string: Option<String>,
    query_params: HashMap<String, String>,
    body_params: HashMap<String, String>,
    path_params: HashMap<String, String>,
    params: HashMap<String, String>,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
    body: Option<Bytes>,
    /// Session data loaded for this client
    pub session: Session,
    /// Remote address, when known
    pub client_address: Option<String>,
}

impl Request {
    /// Build a request by hand
    ///
    /// `path` may carry a query string. Invalid header names or values are
    /// skipped.
    #[must_use]
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers_map: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Self {
        let path = path.into();
        let (path, query_string) = match path.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (path, None),
        };

        let mut headers = HeaderMap::new();
        for (name, value) in headers_map {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.insert(name, value);
            }
        }

        Self::assemble(method, path, query_string, headers, body)
    }

    /// A bodiless request with no headers
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, HashMap::new(), None)
    }

    /// A form-encoded POST
    #[must_use]
    pub fn post_form(path: impl Into<String>, form: &str) -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        Self::new(
            Method::Post,
            path,
            headers,
            Some(Bytes::copy_from_slice(form.as_bytes())),
        )
    }

    /// Read a hyper request, refusing bodies over `max_body_size`
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` for oversized bodies,
    /// `Error::RouteNotFound` for methods the router does not handle, and
    /// `Error::Http` when the body cannot be read.
    pub async fn from_hyper_with_limit(
        request: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let uri = request.uri();
        let path = uri.path().to_string();
        let query_string = uri.query().map(String::from);

        let method = Method::from_hyper(request.method())
            .ok_or_else(|| Error::RouteNotFound { path: path.clone() })?;

        let headers = request.headers().clone();
        let declared = headers
            .get(CONTENT_LENGTH)
            .and_then(|len| len.to_str().ok())
            .and_then(|len| len.parse::<usize>().ok());
        if let Some(actual) = declared.filter(|len| *len > max_body_size) {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual,
            });
        }

        let bytes = request.into_body().collect().await?.to_bytes();
        if bytes.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: bytes.len(),
            });
        }
        let body = (!bytes.is_empty()).then_some(bytes);

        Ok(Self::assemble(method, path, query_string, headers, body))
    }

    fn assemble(
        method: Method,
        path: String,
        query_string: Option<String>,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Self {
        let query_params = parse_query_string(query_string.as_deref());
        let cookies = parse_cookies(&headers);
        let body_params = parse_body(&headers, body.as_deref());

        let mut request = Self {
            method,
            path,
            query_string,
            query_params,
            body_params,
            path_params: HashMap::new(),
            params: HashMap::new(),
            headers,
            cookies,
            body,
            session: Session::new(),
            client_address: None,
        };
        request.merge_params();
        request
    }

    fn merge_params(&mut self) {
        self.params = self
            .query_params
            .iter()
            .chain(&self.body_params)
            .chain(&self.path_params)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
    }

    /// Attach the router's path parameters
    pub fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
        self.merge_params();
    }

    /// Merged parameter by name
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// All merged parameters
    #[must_use]
    pub const fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Query string parameters only
    #[must_use]
    pub const fn query_map(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
    }

    /// All headers with text values
    #[must_use]
    pub fn headers_map(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect()
    }

    /// Cookie value by name
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Raw body bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Body as UTF-8 text
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        self.body_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }
}

fn parse_body(headers: &HeaderMap, body: Option<&[u8]>) -> HashMap<String, String> {
    let Some(body) = body else {
        return HashMap::new();
    };
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        std::str::from_utf8(body)
            .map(|form| parse_query_string(Some(form)))
            .unwrap_or_default()
    } else if content_type.starts_with("application/json") {
        json_body_params(body).unwrap_or_else(|e| {
            debug!(error = %e, "Ignoring unparseable JSON body");
            HashMap::new()
        })
    } else {
        HashMap::new()
    }
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse `a=1&b=2` into a map, last duplicate wins
fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (url_decode(key), url_decode(value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Percent-decode a form component, treating `+` as a space
///
/// Decoded bytes are reassembled as UTF-8, so multi-byte sequences such as
/// `%C3%A9` survive. Malformed escapes are kept literally.
fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'+' => decoded.push(b' '),
            b'%' => {
                let escaped = bytes
                    .get(index + 1..index + 3)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(byte) = escaped {
                    decoded.push(byte);
                    index += 2;
                } else {
                    decoded.push(b'%');
                }
            }
            byte => decoded.push(byte),
        }
        index += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string() {
        let result = parse_query_string(Some("page=1&color=red&empty"));
        assert_eq!(result["page"], "1");
        assert_eq!(result["color"], "red");
        assert_eq!(result["empty"], "");
        assert!(parse_query_string(None).is_empty());
    }

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("top+hat"), "top hat");
        assert_eq!(url_decode("top%20hat"), "top hat");
        assert_eq!(url_decode("100%25"), "100%");
        assert_eq!(url_decode("caf%C3%A9"), "café");
        assert_eq!(url_decode("50%"), "50%");
        assert_eq!(url_decode("%zz"), "%zz");
    }

    #[test]
    fn test_query_in_path() {
        let request = Request::get("/hats?color=red");
        assert_eq!(request.path, "/hats");
        assert_eq!(request.query_string(), Some("color=red"));
        assert_eq!(request.param("color"), Some("red"));
    }

    #[test]
    fn test_form_body_params() {
        let request = Request::post_form("/hats", "hat%5Bcolor%5D=blue&_csrfKey=abcd");
        assert_eq!(request.param("hat[color]"), Some("blue"));
        assert_eq!(request.param("_csrfKey"), Some("abcd"));
        assert_eq!(request.body_str(), Some("hat%5Bcolor%5D=blue&_csrfKey=abcd"));
    }

    #[test]
    fn test_json_body_params() {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let request = Request::new(
            Method::Post,
            "/hats",
            headers,
            Some(Bytes::from_static(br#"{"_csrfKey": "abcd", "brim_size": 10}"#)),
        );
        assert_eq!(request.param("_csrfKey"), Some("abcd"));
        assert_eq!(request.param("brim_size"), Some("10"));
    }

    #[test]
    fn test_param_precedence() {
        let mut request = Request::post_form("/hats/1?id=query&color=query", "id=body");
        assert_eq!(request.param("id"), Some("body"));
        assert_eq!(request.param("color"), Some("query"));

        let mut path_params = HashMap::new();
        path_params.insert("id".to_string(), "1".to_string());
        request.set_path_params(path_params);
        assert_eq!(request.param("id"), Some("1"));
        assert_eq!(request.param("color"), Some("query"));
    }

    #[test]
    fn test_headers_and_cookies() {
        let mut headers = HashMap::new();
        headers.insert(
            "Cookie".to_string(),
            "_tailor_session=abc123; theme=dark".to_string(),
        );
        let mut request = Request::new(Method::Get, "/", headers, None);
        assert_eq!(request.cookie("_tailor_session"), Some("abc123"));
        assert_eq!(request.cookie("theme"), Some("dark"));
        assert_eq!(request.header("cookie").map(str::len), Some(34));

        request.set_header("If-None-Match", "\"tag\"");
        assert_eq!(request.header("if-none-match"), Some("\"tag\""));
        assert_eq!(request.headers_map().len(), 2);
    }
}
