//! Rate limited, observable listing of dynamic Kubernetes resources.
//!
//! Resources are addressed by a [`ResourceCoordinate`] and returned as schema-less
//! [`DynamicObject`]s, so no API discovery round trips are made. Every request goes
//! through a token bucket and is reported to a [`RequestObserver`] before it is sent.
//!
//! ```no_run
//! use kube_lister::{create_client, list_resources, DefaultResolver, PrintObserver, RateLimitPolicy, ResolveConfig};
//!
//! # async fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DefaultResolver::new().resolve().await?;
//! let handle = create_client(config, RateLimitPolicy::new(1.0, 1)?, PrintObserver)?;
//! let coordinate = "workloads.carto.run/v1alpha1".parse()?;
//! for workload in list_resources(&handle, &coordinate, "default").await? {
//!     println!("{:?}", workload.metadata.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
mod coordinate;
pub mod error;
pub mod lister;

#[doc(inline)]
pub use client::{
    create_client, ClientHandle, ObservedRequest, PrintObserver, RateLimitPolicy, RequestObserver,
    TracingObserver,
};
#[doc(inline)] pub use config::{ClusterEndpointConfig, DefaultResolver, ResolveConfig};
pub use coordinate::ResourceCoordinate;
#[doc(inline)] pub use error::{ConnectionError, CoordinateError, ListError, PolicyError};
#[doc(inline)]
pub use lister::{list_resources, list_resources_paged};

pub use kube::api::DynamicObject;
