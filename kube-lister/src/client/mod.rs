//! Building rate limited, observed clients
//!
//! A [`ClientHandle`] is a [`kube::Client`] whose service stack paces every request
//! through a token bucket and reports it to a [`RequestObserver`] before it is sent:
//!
//! ```text
//! RateLimit -> Observe -> base uri / auth / trace -> transport
//! ```
use bytes::Bytes;
use http::{Request, Response};
use kube::client::{Body, ClientBuilder};
use tower::{BoxError, Service, ServiceBuilder};

use crate::{config::ClusterEndpointConfig, error::ConnectionError};

mod observe;
mod rate_limit;

pub use observe::{Observe, ObserveLayer, ObservedRequest, PrintObserver, RequestObserver, TracingObserver};
pub use rate_limit::{RateLimit, RateLimitLayer, RateLimitPolicy};

/// Client for one cluster with rate limiting and request observation applied.
///
/// Cheap to clone. Clones share the token bucket, so the policy holds across all of them.
#[derive(Clone)]
pub struct ClientHandle {
    client: kube::Client,
    policy: RateLimitPolicy,
    default_ns: String,
}

/// Build a [`ClientHandle`] for the cluster described by `config`.
///
/// Requests are paced according to `policy`; requests beyond the burst allowance are delayed,
/// never dropped. `observer` sees every request after it leaves the limiter and before it is sent.
///
/// Fails with [`ConnectionError`] if `config` has no usable server address or the transport
/// cannot be set up from it (bad TLS material, unsupported proxy). Nothing is retried.
pub fn create_client(
    config: ClusterEndpointConfig,
    policy: RateLimitPolicy,
    observer: impl RequestObserver,
) -> Result<ClientHandle, ConnectionError> {
    config.validate()?;
    let server = config.server().clone();
    let default_ns = config.default_namespace().to_string();

    let client = ClientBuilder::try_from(config.into_kube_config())
        .map_err(ConnectionError::BuildClient)?
        .with_layer(&ObserveLayer::new(server.clone(), observer))
        .with_layer(&RateLimitLayer::new(policy))
        .build();
    tracing::debug!(%server, %policy, "created client");

    Ok(ClientHandle {
        client,
        policy,
        default_ns,
    })
}

impl ClientHandle {
    /// Build a handle over a custom transport `service`.
    ///
    /// `service` receives requests relative to the server, exactly as [`kube::Client::new`] expects;
    /// `config` only supplies the server address reported to `observer` and the default namespace.
    pub fn from_service<S, B>(
        service: S,
        config: &ClusterEndpointConfig,
        policy: RateLimitPolicy,
        observer: impl RequestObserver,
    ) -> Self
    where
        S: Service<Request<Body>, Response = Response<B>> + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<BoxError>,
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let service = ServiceBuilder::new()
            .layer(RateLimitLayer::new(policy))
            .layer(ObserveLayer::new(config.server().clone(), observer))
            .service(service);
        Self {
            client: kube::Client::new(service, config.default_namespace()),
            policy,
            default_ns: config.default_namespace().to_string(),
        }
    }

    /// The underlying client
    pub fn client(&self) -> &kube::Client {
        &self.client
    }

    /// The policy requests are paced with
    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Namespace of the resolved context
    pub fn default_namespace(&self) -> &str {
        &self.default_ns
    }
}
