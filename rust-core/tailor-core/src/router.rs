//! # Router
//!
//! Radix-trie routing with `matchit`, one trie per HTTP method.
//!
//! Path parameters use braces (`/hats/{id}`) and catch-alls use a star
//! (`/assets/{*path}`). Matched parameters are handed to the request, where
//! they take precedence over query and body parameters of the same name.

use crate::error::{Error, Result};
use matchit::Router as MatchitRouter;
use std::collections::HashMap;
use std::fmt;

/// HTTP methods the router understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
}

impl Method {
    /// Read-only methods that never change server state
    ///
    /// CSRF checks are skipped for these.
    #[must_use]
    pub const fn is_safe(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options)
    }

    /// Convert a hyper method, `None` for methods the router does not route
    #[must_use]
    pub fn from_hyper(method: &hyper::Method) -> Option<Self> {
        match *method {
            hyper::Method::GET => Some(Self::Get),
            hyper::Method::POST => Some(Self::Post),
            hyper::Method::PUT => Some(Self::Put),
            hyper::Method::DELETE => Some(Self::Delete),
            hyper::Method::PATCH => Some(Self::Patch),
            hyper::Method::HEAD => Some(Self::Head),
            hyper::Method::OPTIONS => Some(Self::Options),
            _ => None,
        }
    }

    /// Upper-case method name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route handler identifier
pub type HandlerId = usize;

/// A matched route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Handler registered for the route
    pub handler_id: HandlerId,
    /// Path parameters by name
    pub params: HashMap<String, String>,
}

/// Method to path-trie routing table
#[derive(Clone, Default)]
pub struct Router {
    method_routes: HashMap<Method, MatchitRouter<HandlerId>>,
    next_handler_id: HandlerId,
}

impl Router {
    /// Create an empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path pattern for a method
    ///
    /// Handler ids are assigned in registration order, starting at zero.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern is malformed or
    /// conflicts with an existing route.
    pub fn add_route(&mut self, method: Method, path: &str) -> Result<HandlerId> {
        let handler_id = self.next_handler_id;

        self.method_routes
            .entry(method)
            .or_insert_with(MatchitRouter::new)
            .insert(path, handler_id)
            .map_err(|e| Error::InvalidRoutePattern {
                pattern: path.to_string(),
                reason: e.to_string(),
            })?;

        self.next_handler_id += 1;
        Ok(handler_id)
    }

    /// Find the route for a request
    ///
    /// # Errors
    ///
    /// Returns `Error::RouteNotFound` if no route matches.
    pub fn match_route(&self, method: Method, path: &str) -> Result<Match> {
        let not_found = || Error::RouteNotFound {
            path: path.to_string(),
        };

        let matched = self
            .method_routes
            .get(&method)
            .ok_or_else(not_found)?
            .at(path)
            .map_err(|_| not_found())?;

        Ok(Match {
            handler_id: *matched.value,
            params: matched
                .params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        })
    }

    /// Register a GET route
    ///
    /// # Errors
    ///
    /// See [`Router::add_route`].
    pub fn get(&mut self, path: &str) -> Result<HandlerId> {
        self.add_route(Method::Get, path)
    }

    /// Register a POST route
    ///
    /// # Errors
    ///
    /// See [`Router::add_route`].
    pub fn post(&mut self, path: &str) -> Result<HandlerId> {
        self.add_route(Method::Post, path)
    }

    /// Register a PUT route
    ///
    /// # Errors
    ///
    /// See [`Router::add_route`].
    pub fn put(&mut self, path: &str) -> Result<HandlerId> {
        self.add_route(Method::Put, path)
    }

    /// Register a DELETE route
    ///
    /// # Errors
    ///
    /// See [`Router::add_route`].
    pub fn delete(&mut self, path: &str) -> Result<HandlerId> {
        self.add_route(Method::Delete, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_ids_follow_registration_order() {
        let mut router = Router::new();
        assert_eq!(router.get("/").unwrap(), 0);
        assert_eq!(router.get("/hats").unwrap(), 1);
        assert_eq!(router.post("/hats").unwrap(), 2);

        assert_eq!(router.match_route(Method::Get, "/hats").unwrap().handler_id, 1);
        assert_eq!(router.match_route(Method::Post, "/hats").unwrap().handler_id, 2);
    }

    #[test]
    fn test_path_parameters() {
        let mut router = Router::new();
        router.get("/shelfs/{shelf_id}/hats/{id}").unwrap();

        let matched = router.match_route(Method::Get, "/shelfs/4/hats/9").unwrap();
        assert_eq!(matched.params["shelf_id"], "4");
        assert_eq!(matched.params["id"], "9");
    }

    #[test]
    fn test_route_not_found() {
        let mut router = Router::new();
        router.get("/hats").unwrap();

        assert!(matches!(
            router.match_route(Method::Get, "/coats"),
            Err(Error::RouteNotFound { .. })
        ));
        assert!(router.match_route(Method::Delete, "/hats").is_err());
    }

    #[test]
    fn test_conflicting_route() {
        let mut router = Router::new();
        router.get("/hats/{id}").unwrap();
        let result = router.get("/hats/{id}");
        assert!(matches!(result, Err(Error::InvalidRoutePattern { .. })));
        assert_eq!(router.get("/shelfs").unwrap(), 1);
    }

    #[test]
    fn test_safe_methods() {
        assert!(Method::Get.is_safe());
        assert!(Method::Head.is_safe());
        assert!(Method::Options.is_safe());
        assert!(!Method::Post.is_safe());
        assert!(!Method::Delete.is_safe());
    }

    #[test]
    fn test_from_hyper() {
        assert_eq!(Method::from_hyper(&hyper::Method::PATCH), Some(Method::Patch));
        assert_eq!(Method::from_hyper(&hyper::Method::TRACE), None);
        assert_eq!(Method::Put.to_string(), "PUT");
    }
}
