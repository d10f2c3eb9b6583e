//! Reporting every outbound request to an injectable observer.
use std::{
    fmt,
    sync::Arc,
    task::{Context, Poll},
};

use http::{Method, Request, Uri};
use tower::{Layer, Service};

/// Description of a request about to be sent to the API server
#[derive(Debug, Clone, Copy)]
pub struct ObservedRequest<'a> {
    method: &'a Method,
    uri: &'a Uri,
    server: &'a Uri,
}

impl<'a> ObservedRequest<'a> {
    /// HTTP method of the request
    pub fn method(&self) -> &'a Method {
        self.method
    }

    /// Path and query of the request as issued by the client
    pub fn path_and_query(&self) -> &'a str {
        self.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }

    /// Full URL the request is sent to
    ///
    /// Requests built by the client are relative; they are resolved against the server address
    /// the same way the base URI middleware does, keeping any path prefix of the server.
    pub fn url(&self) -> String {
        if self.uri.authority().is_some() {
            return self.uri.to_string();
        }
        let server = self.server.to_string();
        format!("{}{}", server.trim_end_matches('/'), self.path_and_query())
    }
}

impl fmt::Display for ObservedRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url())
    }
}

/// Capability invoked synchronously for each outbound request before it is sent.
///
/// Observers see the request but cannot alter, delay or reject it.
/// Any `Fn(&ObservedRequest)` closure is an observer.
pub trait RequestObserver: Send + Sync + 'static {
    /// Called once per outbound request
    fn observe(&self, request: &ObservedRequest<'_>);
}

impl<F> RequestObserver for F
where
    F: Fn(&ObservedRequest<'_>) + Send + Sync + 'static,
{
    fn observe(&self, request: &ObservedRequest<'_>) {
        self(request)
    }
}

/// Prints `METHOD URL` for every request on stderr
#[derive(Clone, Copy, Debug, Default)]
pub struct PrintObserver;

impl RequestObserver for PrintObserver {
    fn observe(&self, request: &ObservedRequest<'_>) {
        eprintln!("{request}");
    }
}

/// Emits a `debug` event for every request
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl RequestObserver for TracingObserver {
    fn observe(&self, request: &ObservedRequest<'_>) {
        tracing::debug!(http.method = %request.method(), http.url = %request.url(), "outbound request");
    }
}

/// Layer reporting each request to a [`RequestObserver`]
#[derive(Clone)]
pub struct ObserveLayer {
    observer: Arc<dyn RequestObserver>,
    server: Arc<Uri>,
}

impl ObserveLayer {
    /// Report requests sent to `server` to `observer`
    pub fn new(server: Uri, observer: impl RequestObserver) -> Self {
        Self {
            observer: Arc::new(observer),
            server: Arc::new(server),
        }
    }
}

impl<S> Layer<S> for ObserveLayer {
    type Service = Observe<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Observe {
            inner,
            observer: self.observer.clone(),
            server: self.server.clone(),
        }
    }
}

/// Service reporting each request to a [`RequestObserver`]. See [`ObserveLayer`].
#[derive(Clone)]
pub struct Observe<S> {
    inner: S,
    observer: Arc<dyn RequestObserver>,
    server: Arc<Uri>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for Observe<S>
where
    S: Service<Request<ReqBody>>,
{
    type Error = S::Error;
    type Future = S::Future;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        self.observer.observe(&ObservedRequest {
            method: req.method(),
            uri: req.uri(),
            server: &self.server,
        });
        self.inner.call(req)
    }
}
