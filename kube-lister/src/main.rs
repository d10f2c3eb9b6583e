//! List one dynamic resource type with a rate limited, observed client.
//!
//! Akin to `kubectl get workloads.carto.run -v 10`, minus the discovery calls.
use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use kube::ResourceExt;
use kube_lister::{
    create_client, lister::DEFAULT_PAGE_SIZE, list_resources_paged, DefaultResolver, DynamicObject,
    PrintObserver, RateLimitPolicy, ResolveConfig, ResourceCoordinate, TracingObserver,
};
use tracing::*;
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser)]
#[command(version, about)]
struct App {
    /// Diagnostic verbosity level
    #[arg(long, short = 'v', default_value_t = 0)]
    verbosity: u8,
    /// Kubeconfig to read instead of the default lookup
    #[arg(long)]
    kubeconfig: Option<PathBuf>,
    /// Kubeconfig context to use instead of the current one
    #[arg(long)]
    context: Option<String>,
    /// Namespace to list in, defaults to the namespace of the context
    #[arg(long, short)]
    namespace: Option<String>,
    /// List across all namespaces
    #[arg(long, short = 'A', conflicts_with = "namespace")]
    all_namespaces: bool,
    /// Resource to list as <plural>[.<group>]/<version>
    #[arg(long, default_value = "workloads.carto.run/v1alpha1")]
    resource: ResourceCoordinate,
    /// Sustained requests per second
    #[arg(long, default_value_t = 1.0)]
    qps: f64,
    /// Requests allowed in a burst
    #[arg(long, default_value_t = 1)]
    burst: u32,
    /// Objects requested per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,
    /// Seconds before the listing is abandoned
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// Output format
    #[arg(long, short, value_enum, default_value_t)]
    output: OutputMode,
    /// Log requests at debug level instead of printing them
    #[arg(long)]
    quiet_requests: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Default, PartialEq, Eq)]
enum OutputMode {
    #[default]
    Name,
    Json,
    Yaml,
}

impl App {
    fn resolver(&self) -> DefaultResolver {
        let mut resolver = DefaultResolver::new();
        if let Some(path) = &self.kubeconfig {
            resolver = resolver.kubeconfig(path);
        }
        if let Some(context) = &self.context {
            resolver = resolver.context(context);
        }
        resolver
    }

    fn print(&self, mut objects: Vec<DynamicObject>) -> Result<()> {
        objects.iter_mut().for_each(|o| o.managed_fields_mut().clear()); // hide managed fields
        match self.output {
            OutputMode::Name => {
                for o in &objects {
                    match o.namespace() {
                        Some(ns) => println!("{}/{}", ns, o.name_any()),
                        None => println!("{}", o.name_any()),
                    }
                }
            }
            OutputMode::Json => println!("{}", serde_json::to_string_pretty(&objects)?),
            OutputMode::Yaml => {
                for o in &objects {
                    println!("---\n{}", serde_yaml::to_string(o)?);
                }
            }
        }
        Ok(())
    }
}

fn log_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "info,kube=debug,kube_lister=debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let app: App = clap::Parser::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter(app.verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let policy = RateLimitPolicy::new(app.qps, app.burst).context("invalid rate limit")?;
    let config = app
        .resolver()
        .resolve()
        .await
        .context("failed to resolve cluster config")?;
    let handle = if app.quiet_requests {
        create_client(config, policy, TracingObserver)
    } else {
        create_client(config, policy, PrintObserver)
    }
    .context("failed to create client")?;

    let namespace = match (&app.namespace, app.all_namespaces) {
        (_, true) => String::new(),
        (Some(ns), false) => ns.clone(),
        (None, false) => handle.default_namespace().to_string(),
    };
    info!(resource = %app.resource, %namespace, %policy, "listing");

    let listing = list_resources_paged(&handle, &app.resource, &namespace, app.page_size);
    let objects = tokio::time::timeout(Duration::from_secs(app.timeout), listing)
        .await
        .with_context(|| format!("listing {} timed out after {}s", app.resource, app.timeout))?
        .with_context(|| format!("failed to list {}", app.resource))?;
    if objects.is_empty() {
        info!("no {} found", app.resource);
    }
    app.print(objects)
}
