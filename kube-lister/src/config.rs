//! Resolving connection parameters for a cluster
//!
//! The [`ClusterEndpointConfig`] is always handed to the client factory explicitly.
//! Where it comes from is the business of a [`ResolveConfig`] implementation,
//! with [`DefaultResolver`] covering the usual kubeconfig / in-cluster lookup.
use std::{fmt, future::Future, path::PathBuf};

use http::Uri;
use kube::config::{KubeConfigOptions, Kubeconfig};

use crate::error::ConnectionError;

/// Resolved connection parameters for one cluster.
///
/// Wraps a [`kube::Config`]: server address, credentials, TLS material and default namespace.
#[derive(Clone, Debug)]
pub struct ClusterEndpointConfig {
    config: kube::Config,
}

impl ClusterEndpointConfig {
    /// Wrap an already resolved [`kube::Config`]
    ///
    /// The server address is checked when a client is created from it.
    pub fn new(config: kube::Config) -> Self {
        Self { config }
    }

    /// Ensure the config names an absolute server address
    pub(crate) fn validate(&self) -> Result<(), ConnectionError> {
        let server = &self.config.cluster_url;
        if server.host().map_or(true, str::is_empty) {
            return Err(ConnectionError::MissingServer);
        }
        if server.scheme().is_none() {
            return Err(ConnectionError::RelativeServer(server.to_string()));
        }
        Ok(())
    }

    /// Connection parameters for a bare server address with no credentials
    ///
    /// The default namespace is `default`.
    pub fn from_server(server: &str) -> Result<Self, ConnectionError> {
        let server = server.trim();
        if server.is_empty() {
            return Err(ConnectionError::MissingServer);
        }
        let cluster_url = server
            .parse::<Uri>()
            .map_err(|source| ConnectionError::InvalidServer {
                server: server.to_string(),
                source,
            })?;
        let config = Self::new(kube::Config::new(cluster_url));
        config.validate()?;
        Ok(config)
    }

    /// Replace the namespace used when the caller does not name one
    #[must_use]
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.default_namespace = namespace.into();
        self
    }

    /// The API server address
    pub fn server(&self) -> &Uri {
        &self.config.cluster_url
    }

    /// Namespace selected by the resolved context
    pub fn default_namespace(&self) -> &str {
        &self.config.default_namespace
    }

    pub(crate) fn into_kube_config(self) -> kube::Config {
        self.config
    }
}

/// Source of [`ClusterEndpointConfig`]
pub trait ResolveConfig {
    /// Resolve connection parameters, failing when no usable source exists
    fn resolve(&self) -> impl Future<Output = Result<ClusterEndpointConfig, ConnectionError>> + Send;
}

impl ResolveConfig for ClusterEndpointConfig {
    fn resolve(&self) -> impl Future<Output = Result<ClusterEndpointConfig, ConnectionError>> + Send {
        let config = self.clone();
        async move { Ok(config) }
    }
}

/// Kubeconfig based resolution with optional explicit path and context.
///
/// With neither a path nor any selection set this defers to [`kube::Config::infer`],
/// which tries `KUBECONFIG` / `~/.kube/config` first and the in-cluster environment second.
#[derive(Clone, Default)]
pub struct DefaultResolver {
    kubeconfig: Option<PathBuf>,
    options: KubeConfigOptions,
}

// KubeConfigOptions is not Debug
impl fmt::Debug for DefaultResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultResolver")
            .field("kubeconfig", &self.kubeconfig)
            .field("context", &self.options.context)
            .field("cluster", &self.options.cluster)
            .field("user", &self.options.user)
            .finish()
    }
}

impl DefaultResolver {
    /// Resolver using the ambient lookup
    pub fn new() -> Self {
        Self::default()
    }

    /// Read this kubeconfig file instead of the default locations
    #[must_use]
    pub fn kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Select a context other than `current-context`
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.options.context = Some(context.into());
        self
    }

    fn has_selection(&self) -> bool {
        self.options.context.is_some() || self.options.cluster.is_some() || self.options.user.is_some()
    }
}

impl ResolveConfig for DefaultResolver {
    fn resolve(&self) -> impl Future<Output = Result<ClusterEndpointConfig, ConnectionError>> + Send {
        async move {
            let config = match &self.kubeconfig {
                Some(path) => {
                    tracing::debug!("loading kubeconfig from {}", path.display());
                    let kubeconfig = Kubeconfig::read_from(path).map_err(ConnectionError::Kubeconfig)?;
                    kube::Config::from_custom_kubeconfig(kubeconfig, &self.options)
                        .await
                        .map_err(ConnectionError::Kubeconfig)?
                }
                None if self.has_selection() => kube::Config::from_kubeconfig(&self.options)
                    .await
                    .map_err(ConnectionError::Kubeconfig)?,
                None => kube::Config::infer().await.map_err(ConnectionError::InferConfig)?,
            };
            tracing::debug!(server = %config.cluster_url, namespace = %config.default_namespace, "resolved cluster config");
            let config = ClusterEndpointConfig::new(config);
            config.validate()?;
            Ok(config)
        }
    }
}
