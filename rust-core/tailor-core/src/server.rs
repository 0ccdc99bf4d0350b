//! # HTTP Server
//!
//! Hyper host that runs each route's filter pipeline.
//! Implements graceful shutdown with signal handling.
//!
//! ## Key Features
//!
//! - Async request handling with Tokio runtime
//! - Per-route filter chains, CSRF protection by default
//! - Cookie-keyed sessions backed by a pluggable `SessionStore`
//! - Graceful shutdown on Ctrl-C with a drain timeout

use crate::config::{AppConfig, ServerConfig};
use crate::error::{Error, Result};
use crate::filter::{CsrfFilter, FilterChain, HandlerFuture};
use crate::request::Request;
use crate::response::{Cookie, Response};
use crate::router::{HandlerId, Method, Router};
use crate::session::{random_token, MemorySessionStore, SessionStore};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Route handler
///
/// Receives the request as the filters left it and the response built so
/// far. To change the session a handler sets `Response::session`.
pub type Handler = Arc<dyn for<'a> Fn(&'a Request, Response) -> HandlerFuture<'a> + Send + Sync>;

/// Wrap a function as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a Request, Response) -> HandlerFuture<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
struct Route {
    handler: Handler,
    filters: FilterChain,
}

/// Everything needed to answer a request, shared by all connections
#[derive(Clone)]
struct Dispatcher {
    router: Router,
    routes: Vec<Route>,
    sessions: Arc<dyn SessionStore>,
    cookie_name: String,
}

/// HTTP server
pub struct Server {
    config: ServerConfig,
    dispatcher: Dispatcher,
    default_filters: FilterChain,
}

impl Server {
    /// Create a server with in-memory sessions
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            dispatcher: Dispatcher {
                router: Router::new(),
                routes: Vec::new(),
                sessions: Arc::new(MemorySessionStore::new()),
                cookie_name: crate::config::SessionConfig::default().cookie_name,
            },
            default_filters: FilterChain::new().with(CsrfFilter::new()),
        }
    }

    /// Create a server from the application configuration
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let mut server = Self::new(config.server.clone())
            .with_session_store(Arc::new(MemorySessionStore::with_lifetime(
                config.session.lifetime(),
            )));
        server
            .dispatcher
            .cookie_name
            .clone_from(&config.session.cookie_name);
        server
    }

    /// Bind the server to an address
    #[must_use]
    pub const fn bind(mut self, address: SocketAddr) -> Self {
        self.config.address = address;
        self
    }

    /// Use another session backend
    #[must_use]
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.dispatcher.sessions = store;
        self
    }

    /// The session backend
    #[must_use]
    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.dispatcher.sessions)
    }

    /// Name of the session cookie
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.dispatcher.cookie_name
    }

    /// Filters applied by [`Server::add_route`]
    #[must_use]
    pub const fn default_filters(&self) -> &FilterChain {
        &self.default_filters
    }

    /// Replace the filters applied by [`Server::add_route`]
    ///
    /// Routes already added keep their chain.
    pub fn set_default_filters(&mut self, filters: FilterChain) {
        self.default_filters = filters;
    }

    /// Add a route behind the default filters
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the path is malformed or
    /// already routed for this method.
    pub fn add_route(&mut self, method: Method, path: &str, handler: Handler) -> Result<HandlerId> {
        let filters = self.default_filters.clone();
        self.add_route_with_filters(method, path, handler, filters)
    }

    /// Add a route behind an explicit filter chain
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the path is malformed or
    /// already routed for this method.
    pub fn add_route_with_filters(
        &mut self,
        method: Method,
        path: &str,
        handler: Handler,
        filters: FilterChain,
    ) -> Result<HandlerId> {
        let id = self.dispatcher.router.add_route(method, path)?;
        debug!(%method, path, filters = ?filters.names(), "Route added");
        self.dispatcher.routes.push(Route { handler, filters });
        Ok(id)
    }

    /// Start the server with graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when the socket cannot be bound or accepting fails.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.address;

        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()?
        } else {
            tokio::net::TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr).map_err(|e| Error::BindError {
            address: addr.to_string(),
            source: e,
        })?;

        let listener = socket.listen(1024)?;

        info!("Server listening on http://{}", addr);

        let dispatcher = Arc::new(self.dispatcher.clone());
        let active = Arc::new(AtomicUsize::new(0));
        let max_body_size = self.config.max_body_size;
        let keep_alive = self.config.keep_alive;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);

                    let dispatcher = Arc::clone(&dispatcher);
                    let active = Arc::clone(&active);

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);

                        if let Err(err) = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service_fn(move |req| {
                                let dispatcher = Arc::clone(&dispatcher);
                                async move {
                                    let method = req.method().clone();
                                    let path = req.uri().path().to_string();
                                    let version = req.version();

                                    let response =
                                        handle_request(req, &dispatcher, remote_addr, max_body_size).await;

                                    info!("    {} - \"{} {} {:?}\" {}",
                                        remote_addr,
                                        method,
                                        path,
                                        version,
                                        response.status()
                                    );
                                    Ok::<_, hyper::Error>(response)
                                }
                            }))
                            .await
                        {
                            error!("Error serving connection: {:?}", err);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = shutdown_signal() => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout(), drain)
            .await
            .is_err()
        {
            warn!(
                active = active.load(Ordering::Relaxed),
                "Shutdown timeout reached with connections still open"
            );
        }
        Ok(())
    }

    /// Run a request through routing, filters and sessions without a socket
    pub async fn test_request(&self, mut request: Request) -> Response {
        if let Some(len) = request.body_bytes().map(<[u8]>::len) {
            if len > self.config.max_body_size {
                return payload_too_large();
            }
        }
        if request.client_address.is_none() {
            request.client_address = Some("test".to_string());
        }
        process_request(request, &self.dispatcher).await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

fn payload_too_large() -> Response {
    Response::text("Payload Too Large").with_status(413)
}

/// Core request processing logic (network agnostic)
async fn process_request(mut request: Request, dispatcher: &Dispatcher) -> Response {
    let request_id = match request.header("x-request-id") {
        Some(id) => id.to_string(),
        None => {
            let id = generate_request_id();
            request.set_header("x-request-id", &id);
            id
        }
    };

    let mut session_id = request.cookie(&dispatcher.cookie_name).map(str::to_owned);
    if let Some(id) = session_id.as_deref() {
        let loaded = dispatcher
            .sessions
            .load(id, request.client_address.as_deref())
            .await;
        if let Some(session) = loaded {
            request.session = session;
        } else {
            debug!(request_id = %request_id, "Session missing, expired or from another address, starting a new one");
            session_id = None;
        }
    }

    let Ok(matched) = dispatcher.router.match_route(request.method, &request.path) else {
        return Response::not_found().with_header("x-request-id", &request_id);
    };
    request.set_path_params(matched.params);

    let route = &dispatcher.routes[matched.handler_id];
    let (mut request, mut response) = route
        .filters
        .process(request, |request, response| (route.handler)(request, response))
        .await;

    let session = response
        .session
        .take()
        .unwrap_or_else(|| std::mem::take(&mut request.session));
    let client_address = request.client_address.as_deref();

    match (session_id, session.is_empty()) {
        (Some(id), true) => {
            dispatcher.sessions.remove(&id).await;
            let mut expired = Cookie::new(dispatcher.cookie_name.as_str(), "");
            expired.max_age = Some(0);
            response.add_cookie(expired);
        }
        (Some(id), false) => dispatcher.sessions.save(&id, session, client_address).await,
        (None, true) => {}
        (None, false) => match random_token() {
            Ok(id) => {
                dispatcher.sessions.save(&id, session, client_address).await;
                response.add_cookie(Cookie::new(dispatcher.cookie_name.as_str(), id));
            }
            Err(e) => error!(request_id = %request_id, error = %e, "Could not create session"),
        },
    }

    response.set_header("x-request-id", &request_id);
    response
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    dispatcher: &Dispatcher,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let mut request = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(request) => request,
        Err(Error::PayloadTooLarge { limit, actual }) => {
            warn!(limit, actual, "Request body too large");
            return payload_too_large().into_hyper();
        }
        Err(Error::RouteNotFound { .. }) => return Response::not_found().into_hyper(),
        Err(e) => {
            error!("Failed to parse request: {}", e);
            return Response::text("Bad Request").with_status(400).into_hyper();
        }
    };

    request.client_address = Some(remote_addr.ip().to_string());
    process_request(request, dispatcher).await.into_hyper()
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{EtagFilter, CSRF_SESSION_KEY};
    use crate::session::Session;
    use std::collections::HashMap;

    fn show_hat(request: &Request, _response: Response) -> HandlerFuture<'_> {
        Box::pin(async move {
            Response::html(format!("Hat {}", request.param("id").unwrap_or("?")))
        })
    }

    fn create_hat(request: &Request, _response: Response) -> HandlerFuture<'_> {
        Box::pin(async move {
            Response::html(format!("Created {}", request.param("hat[color]").unwrap_or("?")))
                .with_status(201)
        })
    }

    fn sign_in(_request: &Request, _response: Response) -> HandlerFuture<'_> {
        Box::pin(async {
            let mut response = Response::redirect("/hats");
            response.session = Some([("userId", "1")].into_iter().collect::<Session>());
            response
        })
    }

    fn server() -> Server {
        let mut server = Server::new(ServerConfig::default());
        server.add_route(Method::Get, "/hats/{id}", handler(show_hat)).unwrap();
        server.add_route(Method::Post, "/hats", handler(create_hat)).unwrap();
        server.add_route(Method::Post, "/sessions", handler(sign_in)).unwrap();
        server
    }

    fn with_cookie(method: Method, path: &str, cookie: &str, form: Option<&str>) -> Request {
        let mut headers = HashMap::new();
        headers.insert("cookie".to_string(), format!("_tailor_session={cookie}"));
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        Request::new(method, path, headers, form.map(|f| Bytes::copy_from_slice(f.as_bytes())))
    }

    #[tokio::test]
    async fn test_routes_with_path_params() {
        let response = server().test_request(Request::get("/hats/7")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body_str(), Some("Hat 7"));
        assert!(response.header("x-request-id").is_some());
    }

    #[tokio::test]
    async fn test_unmatched_path_is_not_found() {
        let response = server().test_request(Request::get("/coats")).await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body_str(), Some("File Not Found"));
    }

    #[tokio::test]
    async fn test_post_without_token_is_rejected() {
        let response = server()
            .test_request(Request::post_form("/hats", "hat[color]=red"))
            .await;
        assert_eq!(response.status, 403);
    }

    #[tokio::test]
    async fn test_csrf_token_round_trip() {
        let server = server();

        let first = server.test_request(Request::get("/hats/1")).await;
        assert_eq!(first.cookies.len(), 1);
        let session_id = first.cookies[0].value.clone();
        assert_eq!(first.cookies[0].name, "_tailor_session");

        let session = server.session_store().load(&session_id, Some("test")).await.unwrap();
        let token = session.get(CSRF_SESSION_KEY).unwrap().to_string();

        let form = format!("_csrfKey={token}&hat[color]=red");
        let response = server
            .test_request(with_cookie(Method::Post, "/hats", &session_id, Some(&form)))
            .await;
        assert_eq!(response.status, 201);
        assert_eq!(response.body_str(), Some("Created red"));
        assert!(response.cookies.is_empty());
    }

    #[tokio::test]
    async fn test_handler_can_replace_session() {
        let mut server = Server::new(ServerConfig::default());
        server
            .add_route_with_filters(Method::Post, "/sessions", handler(sign_in), FilterChain::new())
            .unwrap();

        let response = server.test_request(Request::post_form("/sessions", "")).await;
        assert_eq!(response.status, 303);

        let session_id = response.cookies[0].value.clone();
        let session = server.session_store().load(&session_id, Some("test")).await.unwrap();
        assert_eq!(session.get("userId"), Some("1"));
    }

    #[tokio::test]
    async fn test_route_specific_filters() {
        let mut server = Server::new(ServerConfig::default());
        let filters = server.default_filters().clone().with(EtagFilter::new());
        server
            .add_route_with_filters(Method::Get, "/hats/{id}", handler(show_hat), filters)
            .unwrap();

        let response = server.test_request(Request::get("/hats/2")).await;
        let tag = response.header("ETag").unwrap().to_string();

        let mut headers = HashMap::new();
        headers.insert("if-none-match".to_string(), tag);
        let cached = server
            .test_request(Request::new(Method::Get, "/hats/2", headers, None))
            .await;
        assert_eq!(cached.status, 304);
        assert!(cached.body.is_empty());
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let mut config = ServerConfig::default();
        config.max_body_size = 4;
        let server = Server::new(config);
        let response = server
            .test_request(Request::post_form("/hats", "hat[color]=red"))
            .await;
        assert_eq!(response.status, 413);
    }

    #[tokio::test]
    async fn test_expired_sessions_do_not_accumulate() {
        let store = Arc::new(MemorySessionStore::with_lifetime(Duration::from_millis(100)));
        let mut server = server().with_session_store(store.clone());
        server.add_route(Method::Get, "/hats", handler(show_hat)).unwrap();

        for _ in 0..5 {
            server.test_request(Request::get("/hats")).await;
        }
        assert_eq!(store.len().await, 5);

        tokio::time::sleep(Duration::from_millis(150)).await;
        server.test_request(Request::get("/hats")).await;
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_session_from_another_address_is_replaced() {
        let server = server();
        let first = server.test_request(Request::get("/hats/1")).await;
        let session_id = first.cookies[0].value.clone();

        let mut request = with_cookie(Method::Get, "/hats/1", &session_id, None);
        request.client_address = Some("10.0.0.9".to_string());
        let second = server.test_request(request).await;

        assert_eq!(second.cookies.len(), 1);
        assert_ne!(second.cookies[0].value, session_id);
    }

    #[test]
    fn test_duplicate_route_is_rejected() {
        let mut server = server();
        assert!(server.add_route(Method::Get, "/hats/{id}", handler(show_hat)).is_err());
    }

    #[test]
    fn test_from_config() {
        let config = AppConfig::from_toml_str("[session]\ncookie_name = \"_hats\"\n").unwrap();
        let server = Server::from_config(&config);
        assert_eq!(server.cookie_name(), "_hats");
        assert_eq!(server.default_filters().names(), vec!["CsrfFilter"]);
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(generate_request_id(), generate_request_id());
    }
}
