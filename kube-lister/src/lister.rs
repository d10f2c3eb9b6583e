//! Listing every object of a resource type through a [`ClientHandle`]
use std::collections::HashSet;

use kube::{
    api::{Api, DynamicObject, ListParams},
    core::ApiResource,
};
use tracing::debug;

use crate::{client::ClientHandle, coordinate::ResourceCoordinate, error::ListError};

/// Page size used by [`list_resources`], the same chunk size `kubectl get` uses
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// List all objects of `coordinate` in `namespace`.
///
/// An empty `namespace` lists across the whole cluster, which is also the only option for
/// cluster scoped resources. The coordinate is sent as is; no discovery request is made.
///
/// Pagination is exhausted transparently and pages are concatenated in the order the server
/// returned them. Every physical request goes through the handle's rate limiter and observer.
pub async fn list_resources(
    handle: &ClientHandle,
    coordinate: &ResourceCoordinate,
    namespace: &str,
) -> Result<Vec<DynamicObject>, ListError> {
    list_resources_paged(handle, coordinate, namespace, DEFAULT_PAGE_SIZE).await
}

/// List all objects of `coordinate` in `namespace`, requesting at most `page_size` per request.
///
/// See [`list_resources`].
pub async fn list_resources_paged(
    handle: &ClientHandle,
    coordinate: &ResourceCoordinate,
    namespace: &str,
    page_size: u32,
) -> Result<Vec<DynamicObject>, ListError> {
    if page_size == 0 {
        return Err(ListError::InvalidPageSize);
    }
    let api = dynamic_api(handle, &coordinate.api_resource(), namespace);

    let mut objects = Vec::new();
    let mut continue_token: Option<String> = None;
    let mut seen_tokens = HashSet::new();
    for page in 1.. {
        let mut lp = ListParams::default().limit(page_size);
        if let Some(token) = &continue_token {
            lp = lp.continue_token(token);
        }

        let list = api
            .list(&lp)
            .await
            .map_err(|err| ListError::from_kube(coordinate.to_string(), err))?;
        debug!(resource = %coordinate, page, items = list.items.len(), "fetched page");
        objects.extend(list.items);

        // the last page carries no token, or an empty one
        continue_token = list.metadata.continue_.filter(|token| !token.is_empty());
        match &continue_token {
            None => break,
            Some(token) if !seen_tokens.insert(token.clone()) => {
                return Err(ListError::RepeatedContinue {
                    resource: coordinate.to_string(),
                    token: token.clone(),
                });
            }
            Some(_) => {}
        }
    }

    debug!(resource = %coordinate, namespace, total = objects.len(), "listed");
    Ok(objects)
}

fn dynamic_api(handle: &ClientHandle, ar: &ApiResource, namespace: &str) -> Api<DynamicObject> {
    let client = handle.client().clone();
    if namespace.is_empty() {
        Api::all_with(client, ar)
    } else {
        Api::namespaced_with(client, namespace, ar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{sync::Arc, time::Duration};

    use http::{Request, Response};
    use kube::{client::Body, ResourceExt};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::time::Instant;

    use crate::{
        client::{ObservedRequest, RateLimitPolicy, TracingObserver},
        config::ClusterEndpointConfig,
    };

    const WIDGETS: &str = "/apis/example.com/v1/namespaces/default/widgets";

    fn widgets() -> ResourceCoordinate {
        "widgets.example.com/v1".parse().unwrap()
    }

    fn widget(name: &str) -> Value {
        json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": { "name": name, "namespace": "default" },
            "spec": { "size": name.len() }
        })
    }

    fn names(objects: &[DynamicObject]) -> Vec<String> {
        objects.iter().map(|o| o.name_any()).collect()
    }

    #[tokio::test]
    async fn empty_list_is_not_an_error() {
        let (handle, fakeserver) = testcontext(RateLimitPolicy::new(100.0, 10).unwrap());
        let mocksrv = fakeserver.run(Scenario::Pages(WIDGETS, vec![vec![]]));

        let objects = list_resources(&handle, &widgets(), "default").await.unwrap();
        assert!(objects.is_empty());
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn unknown_kind_is_not_found() {
        let (handle, fakeserver) = testcontext(RateLimitPolicy::new(100.0, 10).unwrap());
        let mocksrv = fakeserver.run(Scenario::Status(404, "NotFound"));

        let coordinate = "gadgets.example.com/v1".parse().unwrap();
        let err = list_resources(&handle, &coordinate, "default").await.unwrap_err();
        assert!(matches!(err, ListError::NotFound { ref resource, .. } if resource == "gadgets.example.com/v1"));
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn authorization_failure_is_forbidden() {
        let (handle, fakeserver) = testcontext(RateLimitPolicy::new(100.0, 10).unwrap());
        let mocksrv = fakeserver.run(Scenario::Status(403, "Forbidden"));

        let err = list_resources(&handle, &widgets(), "default").await.unwrap_err();
        assert!(matches!(err, ListError::Forbidden { .. }));
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn transport_failure_is_unavailable() {
        let (handle, fakeserver) = testcontext(RateLimitPolicy::new(100.0, 10).unwrap());
        let mocksrv = fakeserver.run(Scenario::ConnectionRefused);

        let err = list_resources(&handle, &widgets(), "default").await.unwrap_err();
        assert!(matches!(err, ListError::Unavailable(_)), "got {err:?}");
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn credential_failure_is_not_a_decode_error() {
        let (handle, fakeserver) = testcontext(RateLimitPolicy::new(100.0, 10).unwrap());
        let mocksrv = fakeserver.run(Scenario::AuthFailure("exec plugin failed"));

        let err = list_resources(&handle, &widgets(), "default").await.unwrap_err();
        assert!(matches!(err, ListError::Credentials { .. }), "got {err:?}");
        assert!(err.to_string().contains("exec plugin failed"));
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn repeated_continue_token_stops_paging() {
        let (handle, fakeserver) = testcontext(RateLimitPolicy::new(100.0, 10).unwrap());
        let mocksrv = fakeserver.run(Scenario::StuckContinue(WIDGETS, 2));

        let err = list_resources_paged(&handle, &widgets(), "default", 1).await.unwrap_err();
        assert!(
            matches!(err, ListError::RepeatedContinue { ref token, .. } if token == "page-1"),
            "got {err:?}"
        );
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let (handle, _fakeserver) = testcontext(RateLimitPolicy::default());
        let err = list_resources_paged(&handle, &widgets(), "default", 0).await.unwrap_err();
        assert!(matches!(err, ListError::InvalidPageSize));
    }

    #[tokio::test]
    async fn pages_are_concatenated_in_server_order() {
        let (handle, fakeserver) = testcontext(RateLimitPolicy::new(100.0, 10).unwrap());
        let pages = vec![
            vec![widget("a"), widget("b"), widget("c")],
            vec![widget("d")],
            vec![],
            vec![widget("e"), widget("f"), widget("g")],
        ];
        let mocksrv = fakeserver.run(Scenario::Pages(WIDGETS, pages));

        let objects = list_resources_paged(&handle, &widgets(), "default", 3).await.unwrap();
        assert_eq!(names(&objects), ["a", "b", "c", "d", "e", "f", "g"]);
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn empty_namespace_lists_cluster_wide() {
        let (handle, fakeserver) = testcontext(RateLimitPolicy::new(100.0, 10).unwrap());
        let mocksrv = fakeserver.run(Scenario::Pages("/apis/example.com/v1/widgets", vec![vec![
            widget("x"),
        ]]));

        let objects = list_resources(&handle, &widgets(), "").await.unwrap();
        assert_eq!(names(&objects), ["x"]);
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test(start_paused = true)]
    async fn paced_paginated_list_of_three_widgets() {
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        let observer = move |req: &ObservedRequest<'_>| sink.lock().push((Instant::now(), req.url()));

        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let config = ClusterEndpointConfig::from_server("https://stub.example.com").unwrap();
        let client = ClientHandle::from_service(mock_service, &config, RateLimitPolicy::new(1.0, 1).unwrap(), observer);
        let pages = vec![vec![widget("w1")], vec![widget("w2")], vec![widget("w3")]];
        let mocksrv = ApiServerVerifier(handle).run(Scenario::Pages(WIDGETS, pages));

        let objects = list_resources_paged(&client, &widgets(), "default", 1).await.unwrap();
        assert_eq!(names(&objects), ["w1", "w2", "w3"]);
        tokio::time::timeout(Duration::from_secs(5), mocksrv)
            .await
            .expect("timeout on mock apiserver")
            .expect("scenario succeeded");

        let observed = observed.lock().clone();
        assert_eq!(observed.len(), 3, "one request per page and no discovery");
        for (_, url) in &observed {
            assert!(url.starts_with(&format!("https://stub.example.com{WIDGETS}?")), "{url}");
        }
        for pair in observed.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_secs(1));
        }
    }

    // ------------------------------------------------------------------------
    // mock test setup cruft
    // ------------------------------------------------------------------------

    type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;
    struct ApiServerVerifier(ApiServerHandle);

    async fn timeout_after_1s(handle: tokio::task::JoinHandle<()>) {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("timeout on mock apiserver")
            .expect("scenario succeeded")
    }

    /// Scenarios the fake apiserver can play
    enum Scenario {
        /// Serve a list split across these pages, expecting requests on this path
        Pages(&'static str, Vec<Vec<Value>>),
        /// Reject the first request with a `Status`
        Status(u16, &'static str),
        /// Fail the first request at the transport level
        ConnectionRefused,
        /// Fail the first request in the auth layer with this exec error
        AuthFailure(&'static str),
        /// Answer this many requests on the path, always with the same continue token
        StuckContinue(&'static str, usize),
    }

    impl ApiServerVerifier {
        /// One scenario per test; await the handle to ensure every expected call was made
        fn run(self, scenario: Scenario) -> tokio::task::JoinHandle<()> {
            tokio::spawn(async move {
                match scenario {
                    Scenario::Pages(path, pages) => self.handle_pages(path, pages).await,
                    Scenario::Status(code, reason) => self.handle_status(code, reason).await,
                    Scenario::ConnectionRefused => self.handle_refused().await,
                    Scenario::AuthFailure(msg) => self.handle_auth_failure(msg).await,
                    Scenario::StuckContinue(path, count) => self.handle_stuck_continue(path, count).await,
                };
            })
        }

        async fn handle_pages(mut self, path: &str, pages: Vec<Vec<Value>>) -> Self {
            let count = pages.len();
            for (i, items) in pages.into_iter().enumerate() {
                let (request, send) = self.0.next_request().await.expect("service not called");
                assert_eq!(request.method(), http::Method::GET);
                assert_eq!(request.uri().path(), path);
                let query = request.uri().query().unwrap_or_default().to_string();
                assert!(query.contains("limit="));
                if i == 0 {
                    assert!(!query.contains("continue=")); // first list has no continue
                } else {
                    assert!(query.contains(&format!("continue=page-{i}")));
                }

                let token = if i + 1 < count {
                    format!("page-{}", i + 1)
                } else {
                    String::new()
                };
                let respdata = json!({
                    "apiVersion": "example.com/v1",
                    "kind": "WidgetList",
                    "metadata": { "continue": token, "resourceVersion": "100" },
                    "items": items,
                });
                let response = serde_json::to_vec(&respdata).unwrap();
                send.send_response(Response::builder().body(Body::from(response)).unwrap());
            }
            self
        }

        async fn handle_status(mut self, code: u16, reason: &str) -> Self {
            let (_request, send) = self.0.next_request().await.expect("service not called");
            let status = json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "message": format!("{reason} for test"),
                "reason": reason,
                "code": code,
            });
            let response = serde_json::to_vec(&status).unwrap();
            send.send_response(
                Response::builder()
                    .status(code)
                    .body(Body::from(response))
                    .unwrap(),
            );
            self
        }

        async fn handle_refused(mut self) -> Self {
            let (_request, send) = self.0.next_request().await.expect("service not called");
            send.send_error("connection refused");
            self
        }

        async fn handle_auth_failure(mut self, msg: &str) -> Self {
            let (_request, send) = self.0.next_request().await.expect("service not called");
            send.send_error(kube::Error::Auth(kube::client::AuthError::AuthExec(msg.into())));
            self
        }

        async fn handle_stuck_continue(mut self, path: &str, count: usize) -> Self {
            for i in 0..count {
                let (request, send) = self.0.next_request().await.expect("service not called");
                assert_eq!(request.uri().path(), path);
                if i > 0 {
                    assert!(request.uri().query().unwrap_or_default().contains("continue=page-1"));
                }
                let respdata = json!({
                    "apiVersion": "example.com/v1",
                    "kind": "WidgetList",
                    "metadata": { "continue": "page-1", "resourceVersion": "100" },
                    "items": [widget(&format!("w{i}"))],
                });
                let response = serde_json::to_vec(&respdata).unwrap();
                send.send_response(Response::builder().body(Body::from(response)).unwrap());
            }
            self
        }
    }

    // Create a test context with a rate limited client over a mocked transport
    fn testcontext(policy: RateLimitPolicy) -> (ClientHandle, ApiServerVerifier) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let config = ClusterEndpointConfig::from_server("https://stub.example.com").unwrap();
        let client = ClientHandle::from_service(mock_service, &config, policy, TracingObserver);
        (client, ApiServerVerifier(handle))
    }
}
