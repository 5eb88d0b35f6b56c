use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vip_controller_address::AddressBackend;
use vip_controller_advertiser::AdvertiserBackend;
use vip_controller_core::{Config, ServiceSnapshot, SnapshotDiff, TrafficPolicy, Uid};
use vip_controller_k8s_actor::{metrics::ActorMetrics, ActorDeps, ActorHandle};
use vip_controller_k8s_api::{Client, EventSource, ResourceExt, Service, ServiceEvent};
use vip_controller_k8s_endpoints::{EndpointSource, EndpointTracker};
use vip_controller_registry::Registry;

use crate::election::ElectionConfig;
use crate::error::ControllerError;
use crate::mapping::classify;
use crate::metrics::ControllerMetrics;

/// Drives the whole engine: consumes a restartable Service watch,
/// filters and snapshots each event, and creates/updates/destroys Service
/// Actors through the Instance Registry.
pub struct ServiceController {
    config: Arc<Config>,
    client: Client,
    registry: Registry<Arc<ActorHandle>>,
    address: Arc<dyn AddressBackend>,
    advertiser: Arc<dyn AdvertiserBackend>,
    election: ElectionConfig,
    actor_metrics: ActorMetrics,
    controller_metrics: ControllerMetrics,
}

impl ServiceController {
    pub fn new(
        config: Arc<Config>,
        client: Client,
        address: Arc<dyn AddressBackend>,
        advertiser: Arc<dyn AdvertiserBackend>,
        election: ElectionConfig,
        actor_metrics: ActorMetrics,
        controller_metrics: ControllerMetrics,
    ) -> Self {
        Self {
            config,
            client,
            registry: Registry::new(),
            address,
            advertiser,
            election,
            actor_metrics,
            controller_metrics,
        }
    }

    pub fn registry(&self) -> &Registry<Arc<ActorHandle>> {
        &self.registry
    }

    /// Runs until the process signals shutdown, either gracefully (via
    /// `drain`, draining every actor's host state before returning) or
    /// immediately (via `cancel`, tearing every actor down concurrently).
    pub async fn run(
        &self,
        mut events: impl EventSource<Service>,
        cancel: CancellationToken,
        mut drain: drain::Watch,
    ) -> Result<(), ControllerError> {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("cancellation requested, tearing down all actors immediately");
                    let handles = self.registry.drain();
                    for handle in &handles {
                        handle.cancel();
                    }
                    for handle in handles {
                        handle.join().await;
                    }
                    return Ok(());
                }

                release = drain.signaled() => {
                    info!("graceful shutdown requested, draining all actors");
                    let handles = self.registry.drain();
                    release.release();
                    for handle in handles {
                        handle.join().await;
                    }
                    return Ok(());
                }

                event = events.recv() => {
                    self.controller_metrics.record(&event);
                    self.handle_event(event, drain.clone()).await?;
                }
            }
        }
    }

    async fn handle_event(&self, event: ServiceEvent<Service>, drain: drain::Watch) -> Result<(), ControllerError> {
        match event {
            ServiceEvent::Added(svc) | ServiceEvent::Modified(svc) => self.upsert(svc, drain).await,
            ServiceEvent::Deleted(svc) => {
                let uid = Uid::new(svc.uid().unwrap_or_default());
                self.destroy_actor(&uid).await;
                Ok(())
            }
        }
    }

    /// Implements the dispatch step together with the Modified-event
    /// policy's "diff first, then GC" resolution: the diff against
    /// the last stored snapshot happens here, entirely before any actor
    /// touches the host, so a same-address `Modified` never reaches
    /// `GarbageCollect`/`Assign`/`Withdraw` at all.
    async fn upsert(&self, svc: Service, drain: drain::Watch) -> Result<(), ControllerError> {
        let classified = classify(&svc, &self.config);
        let uid = classified.snapshot.uid.clone();

        let Some(handle) = self.registry.load(&uid) else {
            if classified.decision.is_accept() {
                self.create_actor(classified.snapshot, drain).await?;
            } else {
                info!(?classified.decision, %uid, "rejected service has no actor to create");
            }
            return Ok(());
        };

        let previous = self.registry.last_snapshot(&uid);
        let diff = previous
            .as_ref()
            .map(|previous| classified.snapshot.diff(previous))
            .unwrap_or(SnapshotDiff::AddressesChanged);

        match diff {
            SnapshotDiff::Unchanged => {
                if handle.reconcile(classified.snapshot.clone()).await {
                    self.registry.store(uid, handle, classified.snapshot);
                } else {
                    warn!(%uid, "actor exited unexpectedly, recreating");
                    self.registry.delete(&uid);
                    if classified.decision.is_accept() {
                        self.create_actor(classified.snapshot, drain).await?;
                    }
                }
            }
            SnapshotDiff::AddressesChanged | SnapshotDiff::AcceptedToRejected | SnapshotDiff::RejectedToAccepted => {
                self.destroy_actor(&uid).await;
                if classified.decision.is_accept() {
                    self.create_actor(classified.snapshot, drain).await?;
                }
            }
        }
        Ok(())
    }

    async fn create_actor(&self, snapshot: ServiceSnapshot, drain: drain::Watch) -> Result<(), ControllerError> {
        let election = self
            .election
            .handle_for(&snapshot.namespace, &snapshot.name)
            .await
            .map_err(|source| ControllerError::Election {
                namespace: snapshot.namespace.clone(),
                name: snapshot.name.clone(),
                source,
            })?;

        let tracker = match snapshot.traffic_policy {
            TrafficPolicy::Local => Some(EndpointTracker::spawn(
                self.client.clone(),
                &snapshot.namespace,
                &snapshot.name,
                &self.config.node_name,
                self.endpoint_source(),
            )),
            TrafficPolicy::Cluster => None,
        };

        let deps = ActorDeps {
            address: self.address.clone(),
            advertiser: self.advertiser.clone(),
            metrics: self.actor_metrics.clone(),
        };
        let uid = snapshot.uid.clone();
        let handle = Arc::new(vip_controller_k8s_actor::spawn(snapshot.clone(), election, tracker, deps, drain));
        self.registry.store(uid, handle, snapshot);
        Ok(())
    }

    /// The destroy half of the shutdown ordering guarantee: removes the
    /// UID from the registry before awaiting the actor's teardown, so a
    /// concurrent
    /// `upsert` for the same UID creates a fresh actor rather than racing
    /// this one's shutdown.
    async fn destroy_actor(&self, uid: &Uid) {
        if let Some(handle) = self.registry.load(uid) {
            self.registry.delete(uid);
            handle.shutdown().await;
        }
    }

    fn endpoint_source(&self) -> EndpointSource {
        if self.config.enable_endpoint_slices {
            EndpointSource::EndpointSlices
        } else {
            EndpointSource::Endpoints
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration as StdDuration;

    use vip_controller_address::fake::FakeAddressManager;
    use vip_controller_advertiser::fake::FakeAdvertiser;
    use vip_controller_core::testing::{HostEvent, Timeline};
    use vip_controller_core::{AdvertiserMode, ClassFilterMode, ElectionTopology};
    use vip_controller_k8s_api::fake::FakeEventSource;
    use vip_controller_k8s_api::{LoadBalancerIngress, LoadBalancerStatus, ObjectMeta, ServiceSpec, ServiceStatus};

    /// A `kube::Client` that never dials out; good enough for any scenario
    /// here since every test uses `ElectionConfig::None` and a `Cluster`
    /// traffic policy, so no code path ever calls out to the API server.
    fn test_client() -> Client {
        let config = kube::Config::new("http://127.0.0.1:1".parse().unwrap());
        Client::try_from(config).expect("client builds without dialing out")
    }

    fn config() -> Arc<Config> {
        Arc::new(Config {
            service_namespace: "default".into(),
            load_balancer_class_name: String::new(),
            class_filter: ClassFilterMode::NonLegacy,
            election: ElectionTopology::None,
            advertiser: AdvertiserMode::Route,
            enable_endpoint_slices: true,
            node_name: "node-a".into(),
            interface: "eth0".into(),
            lease_duration: StdDuration::from_secs(15),
            renew_grace_period: StdDuration::from_secs(5),
            arp_gratuitous_interval: StdDuration::from_secs(3),
            vip_cidr_v4: 32,
            vip_cidr_v6: 128,
        })
    }

    fn service(uid: &str, ip: Option<&str>, annotations: BTreeMap<String, String>) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("web".into()),
                namespace: Some("default".into()),
                uid: Some(uid.into()),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".into()),
                ..Default::default()
            }),
            status: ip.map(|ip| ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![LoadBalancerIngress {
                        ip: Some(ip.to_string()),
                        ..Default::default()
                    }]),
                }),
                ..Default::default()
            }),
        }
    }

    fn controller(address: FakeAddressManager, advertiser: FakeAdvertiser) -> ServiceController {
        let mut registry = prometheus_client::registry::Registry::default();
        ServiceController::new(
            config(),
            test_client(),
            Arc::new(address),
            Arc::new(advertiser),
            ElectionConfig::None,
            ActorMetrics::register(&mut registry),
            ControllerMetrics::register(&mut registry),
        )
    }

    async fn run_to_quiescence(controller: Arc<ServiceController>, events: FakeEventSource<Service>, cancel: CancellationToken) {
        let (signal, watch) = drain::channel();
        let task = tokio::spawn(async move { controller.run(events, cancel, watch).await });
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        task.abort();
        drop(signal);
    }

    /// S3: a `Modified` event carrying the same accepted address set is a
    /// no-op on the host — no additional assign/announce calls occur.
    #[tokio::test]
    async fn modified_same_addresses_is_a_host_noop() {
        let timeline = Timeline::new();
        let address = FakeAddressManager::with_timeline(timeline.clone());
        let advertiser = FakeAdvertiser::with_timeline(false, timeline.clone());
        let events = FakeEventSource::new([
            ServiceEvent::Added(service("u1", Some("10.0.0.1"), BTreeMap::new())),
            ServiceEvent::Modified(service("u1", Some("10.0.0.1"), BTreeMap::new())),
        ]);

        let controller = Arc::new(controller(address.clone(), advertiser));
        run_to_quiescence(controller, events, CancellationToken::new()).await;

        let assigns = timeline.events().iter().filter(|e| matches!(e, HostEvent::Assigned(_))).count();
        assert_eq!(assigns, 1, "the unchanged Modified must not re-assign");
        assert!(address.is_bound("10.0.0.1".parse().unwrap()));
    }

    /// S4: a `Modified` event that changes the address set produces an
    /// ordered withdraw+release of the old address before any assign+announce
    /// of the new one.
    #[tokio::test]
    async fn modified_changed_addresses_withdraws_before_assigning() {
        let timeline = Timeline::new();
        let address = FakeAddressManager::with_timeline(timeline.clone());
        let advertiser = FakeAdvertiser::with_timeline(false, timeline.clone());
        let events = FakeEventSource::new([
            ServiceEvent::Added(service("u1", Some("10.0.0.1"), BTreeMap::new())),
            ServiceEvent::Modified(service("u1", Some("10.0.0.2"), BTreeMap::new())),
        ]);

        let controller = Arc::new(controller(address.clone(), advertiser.clone()));
        run_to_quiescence(controller, events, CancellationToken::new()).await;

        assert!(!address.is_bound("10.0.0.1".parse().unwrap()));
        assert!(address.is_bound("10.0.0.2".parse().unwrap()));

        let events = timeline.events();
        let withdraw_idx = events.iter().position(|e| matches!(e, HostEvent::Withdrawn(a) if a.to_string() == "10.0.0.1")).expect("withdraw recorded");
        let assign_idx = events.iter().position(|e| matches!(e, HostEvent::Assigned(a) if a.to_string() == "10.0.0.2")).expect("assign recorded");
        assert!(withdraw_idx < assign_idx);
    }

    /// S5: a `Deleted` event withdraws and releases every configured address
    /// and removes the service from the registry.
    #[tokio::test]
    async fn deleted_withdraws_all_and_removes_from_registry() {
        let address = FakeAddressManager::new();
        let advertiser = FakeAdvertiser::new(false);
        let events = FakeEventSource::new([
            ServiceEvent::Added(service("u1", Some("10.0.0.1"), BTreeMap::new())),
            ServiceEvent::Deleted(service("u1", Some("10.0.0.1"), BTreeMap::new())),
        ]);

        let controller = Arc::new(controller(address.clone(), advertiser));
        let registry_ref = controller.registry().clone();
        run_to_quiescence(controller, events, CancellationToken::new()).await;

        assert!(!address.is_bound("10.0.0.1".parse().unwrap()));
        assert!(registry_ref.is_empty());
    }

    /// S6: an ignore-annotated Service never creates an actor, but the watch
    /// event counter still increments.
    #[tokio::test]
    async fn ignored_service_creates_no_actor_but_counts_event() {
        let address = FakeAddressManager::new();
        let advertiser = FakeAdvertiser::new(false);
        let mut annotations = BTreeMap::new();
        annotations.insert("kube-vip.io/ignore".to_string(), "true".to_string());
        let events = FakeEventSource::new([ServiceEvent::Added(service("u1", Some("10.0.0.1"), annotations))]);

        let controller = Arc::new(controller(address.clone(), advertiser));
        let registry_ref = controller.registry().clone();
        run_to_quiescence(controller, events, CancellationToken::new()).await;

        assert!(!address.is_bound("10.0.0.1".parse().unwrap()));
        assert!(registry_ref.is_empty());
    }
}
