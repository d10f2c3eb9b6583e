use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams},
    runtime::wait::{await_condition, conditions},
    Client, ResourceExt,
};
use kube_lister::{
    create_client, list_resources_paged, DefaultResolver, ObservedRequest, RateLimitPolicy, ResolveConfig,
    ResourceCoordinate,
};
use parking_lot::Mutex;
use tracing::info;

const CRD_NAME: &str = "widgets.example.com";

fn widget_crd() -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": CRD_NAME },
        "spec": {
            "group": "example.com",
            "names": { "kind": "Widget", "listKind": "WidgetList", "plural": "widgets", "singular": "widget" },
            "scope": "Namespaced",
            "versions": [{
                "name": "v1",
                "served": true,
                "storage": true,
                "schema": {
                    "openAPIV3Schema": { "type": "object", "x-kubernetes-preserve-unknown-fields": true }
                }
            }]
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let client = Client::try_default().await?;
    let ssapply = PatchParams::apply("kube-lister-e2e").force();

    info!("Applying widget crd");
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    crds.patch(CRD_NAME, &ssapply, &Patch::Apply(widget_crd())).await?;
    let establish = await_condition(crds.clone(), CRD_NAME, conditions::is_crd_established());
    let _ = tokio::time::timeout(Duration::from_secs(10), establish).await?;

    info!("Applying widgets");
    let gvk = GroupVersionKind::gvk("example.com", "v1", "Widget");
    let ar = ApiResource::from_gvk_with_plural(&gvk, "widgets");
    let widgets: Api<DynamicObject> = Api::namespaced_with(client.clone(), "default", &ar);
    for name in ["w1", "w2", "w3"] {
        let data = serde_json::json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": { "name": name },
            "spec": { "size": 1 }
        });
        widgets.patch(name, &ssapply, &Patch::Apply(data)).await?;
    }

    info!("Listing widgets one per page at one request per second");
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    let observer = move |req: &ObservedRequest<'_>| {
        println!("{req}");
        sink.lock().push(Instant::now());
    };
    let config = DefaultResolver::new().resolve().await?;
    let handle = create_client(config, RateLimitPolicy::new(1.0, 1)?, observer)?;
    let coordinate: ResourceCoordinate = "widgets.example.com/v1".parse()?;
    let listed = list_resources_paged(&handle, &coordinate, "default", 1).await?;

    let mut names: Vec<_> = listed.iter().map(|o| o.name_any()).collect();
    names.sort();
    assert_eq!(names, ["w1", "w2", "w3"]);
    let observed = observed.lock().clone();
    assert!(observed.len() >= 3, "expected one request per page");
    for pair in observed.windows(2) {
        // timer jitter between permit and send
        assert!(pair[1] - pair[0] >= Duration::from_millis(950));
    }
    info!("Listed {} widgets in {} requests", names.len(), observed.len());

    info!("Cleaning up widget crd");
    crds.delete(CRD_NAME, &DeleteParams::default()).await?;
    Ok(())
}
