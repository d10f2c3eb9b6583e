//! Error handling in [`kube_lister`][crate]
use thiserror::Error;

pub use kube::core::ErrorResponse;

/// Possible errors when building a [`RateLimitPolicy`](crate::RateLimitPolicy)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// The sustained rate must be a positive, finite number of permits per second
    #[error("rate must be positive and finite, got {0}")]
    InvalidRate(f64),

    /// The bucket must hold at least one permit
    #[error("burst must be at least 1, got {0}")]
    InvalidBurst(u32),
}

/// Possible errors when resolving connection parameters or building a client
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// No server address was supplied, or it carries no host
    #[error("no server address configured")]
    MissingServer,

    /// The server address could not be parsed as a URI
    #[error("invalid server address {server:?}: {source}")]
    InvalidServer {
        /// The rejected address
        server: String,
        /// Parse failure
        #[source]
        source: http::uri::InvalidUri,
    },

    /// The server address is not an absolute URL
    #[error("server address {0:?} must be an absolute http(s) URL")]
    RelativeServer(String),

    /// An explicitly selected kubeconfig could not be loaded
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[source] kube::config::KubeconfigError),

    /// Neither the local kubeconfig nor the in-cluster environment was usable
    #[error("failed to infer cluster config: {0}")]
    InferConfig(#[source] kube::config::InferConfigError),

    /// The transport stack could not be built from the resolved config
    ///
    /// Typically bad TLS material or an unsupported auth/proxy setup.
    #[error("failed to build client: {0}")]
    BuildClient(#[source] kube::Error),
}

/// Possible errors when listing resources
#[derive(Error, Debug)]
pub enum ListError {
    /// The server does not know the resource type (404)
    #[error("resource {resource} not found: {source}")]
    NotFound {
        /// Display form of the requested coordinate
        resource: String,
        /// Status returned by the server
        #[source]
        source: ErrorResponse,
    },

    /// The credentials were rejected or lack permission (401/403)
    #[error("access to {resource} forbidden: {source}")]
    Forbidden {
        /// Display form of the requested coordinate
        resource: String,
        /// Status returned by the server
        #[source]
        source: ErrorResponse,
    },

    /// Credentials for the request could not be obtained
    ///
    /// Raised before the request is sent, e.g. by a failing exec plugin or an unreadable token file.
    #[error("failed to authenticate list of {resource}: {source}")]
    Credentials {
        /// Display form of the requested coordinate
        resource: String,
        /// Underlying auth error
        #[source]
        source: kube::Error,
    },

    /// The server could not be reached or is temporarily unable to serve
    ///
    /// Covers transport failures as well as 429 and 5xx responses.
    #[error("api server unavailable: {0}")]
    Unavailable(#[source] kube::Error),

    /// Any other rejection by the server
    ///
    /// It's quite common to get a `410 Gone` here when a continue token expired mid-list.
    #[error("list of {resource} rejected: {source}")]
    Rejected {
        /// Display form of the requested coordinate
        resource: String,
        /// Status returned by the server
        #[source]
        source: ErrorResponse,
    },

    /// The response could not be decoded, or the request could not be built
    #[error("failed to decode list of {resource}: {source}")]
    Decode {
        /// Display form of the requested coordinate
        resource: String,
        /// Underlying client error
        #[source]
        source: kube::Error,
    },

    /// The server handed out a continue token it had already returned
    ///
    /// Following it again would page forever.
    #[error("list of {resource} repeated continue token {token:?}")]
    RepeatedContinue {
        /// Display form of the requested coordinate
        resource: String,
        /// The repeated token
        token: String,
    },

    /// A page size of zero would never make progress
    #[error("page size must be at least 1")]
    InvalidPageSize,
}

impl ListError {
    /// Classify a client error for the given resource
    pub(crate) fn from_kube(resource: String, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(source) => match source.code {
                404 => ListError::NotFound { resource, source },
                401 | 403 => ListError::Forbidden { resource, source },
                429 | 500..=599 => ListError::Unavailable(kube::Error::Api(source)),
                _ => ListError::Rejected { resource, source },
            },
            source @ kube::Error::Auth(_) => ListError::Credentials { resource, source },
            err @ (kube::Error::HyperError(_) | kube::Error::Service(_)) => ListError::Unavailable(err),
            source => ListError::Decode { resource, source },
        }
    }
}

/// Possible errors when parsing a [`ResourceCoordinate`](crate::ResourceCoordinate)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
// Redundant with the error messages and machine names
#[allow(missing_docs)]
pub enum CoordinateError {
    #[error("expected <plural>[.<group>]/<version>, got {0:?}")]
    MissingVersion(String),
    #[error("empty resource name in {0:?}")]
    EmptyResource(String),
    #[error("empty version in {0:?}")]
    EmptyVersion(String),
}
