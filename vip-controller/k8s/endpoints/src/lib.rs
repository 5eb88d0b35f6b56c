//! The Endpoint Tracker (component D): projects a Service's `Endpoints` or
//! `EndpointSlice` objects down to the set of backend addresses reachable
//! from this node, behind a `tokio::sync::watch` channel.
#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod project;

use k8s_openapi::api::core::v1::Endpoints;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::runtime::watcher;
use kube::{Api, Client};
use std::collections::HashSet;
use std::net::IpAddr;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};
use vip_controller_k8s_api::{ServiceEvent, Watch};

/// Which object kind backs the tracker, mirroring `EnableEndpointSlices`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EndpointSource {
    Endpoints,
    EndpointSlices,
}

/// Holds the live local-endpoint projection for one Service and the
/// background watch task maintaining it.
pub struct EndpointTracker {
    addresses: watch::Receiver<HashSet<IpAddr>>,
    task: JoinHandle<()>,
}

impl EndpointTracker {
    #[instrument(skip(client), fields(namespace, name))]
    pub fn spawn(client: Client, namespace: &str, name: &str, node_name: &str, source: EndpointSource) -> Self {
        let (tx, rx) = watch::channel(HashSet::new());
        let namespace = namespace.to_string();
        let name = name.to_string();
        let node_name = node_name.to_string();
        let task = tokio::spawn(async move {
            match source {
                EndpointSource::Endpoints => run_endpoints(client, &namespace, &name, &node_name, tx).await,
                EndpointSource::EndpointSlices => run_endpoint_slices(client, &namespace, &name, &node_name, tx).await,
            }
        });
        Self { addresses: rx, task }
    }

    /// The current set of locally-reachable backend addresses.
    pub fn local_addresses(&self) -> HashSet<IpAddr> {
        self.addresses.borrow().clone()
    }

    /// Whether at least one local pod currently backs the service — the
    /// condition `ExternalTrafficPolicy=Local` gates advertisement on.
    pub fn has_local_endpoints(&self) -> bool {
        !self.addresses.borrow().is_empty()
    }

    /// Awaits the next projection change.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.addresses.changed().await
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

async fn run_endpoints(client: Client, namespace: &str, name: &str, node_name: &str, tx: watch::Sender<HashSet<IpAddr>>) {
    let api: Api<Endpoints> = Api::namespaced(client, namespace);
    let field_selector = format!("metadata.name={name}");
    let stream = watcher(api, watcher::Config::default().fields(&field_selector));
    let mut watch: Watch<Endpoints> = Watch::from(stream);
    loop {
        let event = watch.recv().await;
        let endpoints = match event {
            ServiceEvent::Added(obj) | ServiceEvent::Modified(obj) => Some(obj),
            ServiceEvent::Deleted(_) => None,
        };
        let addresses = endpoints.map(|obj| project::endpoints(&obj, node_name)).unwrap_or_default();
        debug!(count = addresses.len(), "endpoints projection updated");
        if tx.send(addresses).is_err() {
            return;
        }
    }
}

async fn run_endpoint_slices(
    client: Client,
    namespace: &str,
    name: &str,
    node_name: &str,
    tx: watch::Sender<HashSet<IpAddr>>,
) {
    let api: Api<EndpointSlice> = Api::namespaced(client, namespace);
    let label_selector = format!("kubernetes.io/service-name={name}");
    let stream = watcher(api, watcher::Config::default().labels(&label_selector));
    let mut watch: Watch<EndpointSlice> = Watch::from(stream);
    let mut by_slice_uid: std::collections::HashMap<String, HashSet<IpAddr>> = std::collections::HashMap::new();
    loop {
        let event = watch.recv().await;
        match event {
            ServiceEvent::Added(obj) | ServiceEvent::Modified(obj) => {
                let uid = kube::ResourceExt::uid(&obj).unwrap_or_default();
                by_slice_uid.insert(uid, project::endpoint_slice(&obj, node_name));
            }
            ServiceEvent::Deleted(obj) => {
                let uid = kube::ResourceExt::uid(&obj).unwrap_or_default();
                by_slice_uid.remove(&uid);
            }
        }
        let addresses: HashSet<IpAddr> = by_slice_uid.values().flatten().copied().collect();
        debug!(count = addresses.len(), "endpoint slice projection updated");
        if tx.send(addresses).is_err() {
            return;
        }
    }
}
