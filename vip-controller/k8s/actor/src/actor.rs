use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn, Instrument};

use vip_controller_address::AddressBackend;
use vip_controller_advertiser::AdvertiserBackend;
use vip_controller_core::{ServiceSnapshot, SnapshotDiff, TrafficPolicy};
use vip_controller_k8s_endpoints::EndpointTracker;

use crate::election::{eligible, ElectionHandle};
use crate::metrics::ActorMetrics;

/// How long a `pending` address (one that failed `Assign`/`Announce` and is
/// awaiting a retry) is left before the actor tries it again.
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

enum Command {
    /// A fresh `ServiceSnapshot` for this UID. The controller is expected to
    /// only ever send `Unchanged` diffs here — anything material should have
    /// gone through destroy-then-recreate instead — but the actor still
    /// checks, since trusting that invariant from the inside is exactly the
    /// kind of silent corruption that produces stuck host state.
    Reconcile(ServiceSnapshot),
    Shutdown,
}

/// The controller's only handle onto a running Service Actor. Every command
/// for one UID funnels through a single `mpsc` queue into a single task, so
/// per-UID ordering falls out of "one queue, one task" rather than a lock.
///
/// Every method takes `&self` — including the ones that terminate the actor
/// — so the controller can hold handles behind an `Arc` in its [Instance
/// Registry][vip_controller_registry::Registry] and still bulk-cancel every
/// actor during whole-process shutdown. `task` is taken out of its `Mutex`
/// exactly once, by whichever caller asks first; a second `join`/`shutdown`
/// on the same handle is a safe no-op.
pub struct ActorHandle {
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ActorHandle {
    /// Queues a same-UID snapshot. Returns `false` if the actor has already
    /// exited — it self-terminated on an invariant violation, or lost a race
    /// with a concurrent destroy — telling the controller to recreate it.
    pub async fn reconcile(&self, snapshot: ServiceSnapshot) -> bool {
        self.commands.send(Command::Reconcile(snapshot)).await.is_ok()
    }

    /// The graceful destroy path: queues a shutdown behind anything
    /// already pending, then awaits the task's
    /// exit, so a freshly created replacement actor for this UID never
    /// starts work before this one's addresses are fully released.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
        self.join().await;
    }

    /// The immediate-cancel path, used for whole-process shutdown where
    /// every actor tears down concurrently rather than one at a time.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Awaits task exit without signaling anything — used after the
    /// process-wide drain or cancellation has already been triggered.
    pub async fn join(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Shared, process-scoped dependencies every actor is constructed with.
#[derive(Clone)]
pub struct ActorDeps {
    pub address: Arc<dyn AddressBackend>,
    pub advertiser: Arc<dyn AdvertiserBackend>,
    pub metrics: ActorMetrics,
}

/// Starts the Service Actor task for one accepted `ServiceSnapshot`.
/// `tracker` is `None` for `ExternalTrafficPolicy=Cluster` services, which
/// don't gate on local endpoint reachability.
pub fn spawn(
    snapshot: ServiceSnapshot,
    election: ElectionHandle,
    tracker: Option<EndpointTracker>,
    deps: ActorDeps,
    drain: drain::Watch,
) -> ActorHandle {
    let (commands_tx, commands_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let span = tracing::info_span!("actor", namespace = %snapshot.namespace, name = %snapshot.name);

    let actor = ServiceActor {
        snapshot,
        election,
        tracker,
        address: deps.address,
        advertiser: deps.advertiser,
        metrics: deps.metrics,
        active: false,
        configured: HashSet::new(),
        pending: HashSet::new(),
    };

    let task_cancel = cancel.clone();
    let task = tokio::spawn(actor.run(commands_rx, task_cancel, drain).instrument(span));

    ActorHandle {
        commands: commands_tx,
        cancel,
        task: Mutex::new(Some(task)),
    }
}

/// The actor's private state machine. `active` distinguishes ARMED
/// (claimed but not fully programmed, or not eligible to advertise) from
/// ACTIVE (every address in `snapshot.addresses` is bound and announced).
struct ServiceActor {
    snapshot: ServiceSnapshot,
    election: ElectionHandle,
    tracker: Option<EndpointTracker>,
    address: Arc<dyn AddressBackend>,
    advertiser: Arc<dyn AdvertiserBackend>,
    metrics: ActorMetrics,
    active: bool,
    /// Addresses currently bound and announced on the host.
    configured: HashSet<IpAddr>,
    /// Addresses that failed `Assign`/`Announce` and are awaiting retry.
    pending: HashSet<IpAddr>,
}

impl ServiceActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken, mut drain: drain::Watch) {
        self.reconcile_activation().await;
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.teardown().await;
                    return;
                }

                release = drain.signaled() => {
                    self.teardown().await;
                    release.release();
                    return;
                }

                cmd = commands.recv() => {
                    match cmd {
                        None | Some(Command::Shutdown) => {
                            self.teardown().await;
                            return;
                        }
                        Some(Command::Reconcile(new)) => {
                            if !self.apply_reconcile(new).await {
                                return;
                            }
                        }
                    }
                }

                transition = self.election.next_transition() => {
                    info!(?transition, "leadership transition");
                    self.reconcile_activation().await;
                }

                changed = self.tracker_changed() => {
                    if changed {
                        self.reconcile_activation().await;
                    }
                }

                _ = self.retry_tick() => {
                    self.reconcile_activation().await;
                }
            }
        }
    }

    /// Applies a same-UID `Reconcile`. A diff other than `Unchanged` here
    /// means the controller delivered a materially different snapshot
    /// directly to a live actor instead of destroying and recreating it:
    /// log and self-terminate so the controller observes the dead handle
    /// and recreates this actor from scratch.
    async fn apply_reconcile(&mut self, new: ServiceSnapshot) -> bool {
        match new.diff(&self.snapshot) {
            SnapshotDiff::Unchanged => {
                self.snapshot = new;
                true
            }
            other => {
                warn!(
                    ?other,
                    "received a materially changed snapshot on a live actor; self-terminating for the controller to recreate"
                );
                self.teardown().await;
                false
            }
        }
    }

    fn endpoints_ready(&self) -> bool {
        match self.snapshot.traffic_policy {
            TrafficPolicy::Cluster => true,
            TrafficPolicy::Local => self.tracker.as_ref().map(EndpointTracker::has_local_endpoints).unwrap_or(false),
        }
    }

    /// Activates or deactivates depending on current eligibility. Called
    /// after every event that could change leadership, endpoint readiness,
    /// or a retry tick becoming due.
    async fn reconcile_activation(&mut self) {
        let want = eligible(self.election.is_leader(), self.endpoints_ready());
        if want {
            self.activate().await;
        } else if self.active || !self.configured.is_empty() {
            self.deactivate().await;
        }
    }

    /// GC, then Assign, then Announce for each not-yet-configured address
    /// (the diff already happened in the controller before this actor was
    /// ever created or reconciled). A per-address failure is logged,
    /// counted, and left in `pending` for the retry tick; the actor is only
    /// marked ACTIVE once
    /// every address in the snapshot is bound and announced.
    #[instrument(skip(self), fields(namespace = %self.snapshot.namespace, name = %self.snapshot.name))]
    async fn activate(&mut self) {
        for addr in self.snapshot.addresses.clone() {
            if self.configured.contains(&addr) {
                continue;
            }
            if let Err(error) = self.address.garbage_collect(addr).await {
                warn!(%addr, %error, "garbage-collect probe failed, proceeding with assign anyway");
            }
            if let Err(error) = self.address.assign(addr).await {
                warn!(%addr, %error, "failed to assign VIP, will retry");
                self.metrics.record_failure(&self.snapshot.namespace, &self.snapshot.name, "assign");
                self.pending.insert(addr);
                continue;
            }
            if let Err(error) = self.advertiser.announce(addr).await {
                warn!(%addr, %error, "failed to announce VIP, will retry");
                self.metrics.record_failure(&self.snapshot.namespace, &self.snapshot.name, "announce");
                self.pending.insert(addr);
                continue;
            }
            self.pending.remove(&addr);
            self.configured.insert(addr);
        }
        let fully_configured = self.snapshot.addresses.iter().all(|addr| self.configured.contains(addr));
        if fully_configured && !self.active {
            info!("service activated");
        }
        self.active = fully_configured;
    }

    /// Withdraws and releases every currently configured address
    /// (ACTIVE -> ARMED). Per-address ordering withdraws before releasing,
    /// matching the host-state property that an address is never bound
    /// without also being announced.
    async fn deactivate(&mut self) {
        let addrs: Vec<IpAddr> = self.configured.drain().collect();
        for addr in addrs {
            if let Err(error) = self.advertiser.withdraw(addr).await {
                warn!(%addr, %error, "failed to withdraw VIP during deactivate");
                self.metrics.record_failure(&self.snapshot.namespace, &self.snapshot.name, "withdraw");
            }
            if let Err(error) = self.address.release(addr).await {
                warn!(%addr, %error, "failed to release VIP during deactivate");
                self.metrics.record_failure(&self.snapshot.namespace, &self.snapshot.name, "release");
            }
        }
        self.pending.clear();
        if self.active {
            info!("service deactivated");
        }
        self.active = false;
    }

    async fn teardown(&mut self) {
        if self.active || !self.configured.is_empty() {
            self.deactivate().await;
        }
        if let Some(tracker) = &self.tracker {
            tracker.stop();
        }
        self.election.release();
        self.advertiser.stop().await;
    }

    async fn tracker_changed(&mut self) -> bool {
        match &mut self.tracker {
            Some(tracker) => tracker.changed().await.is_ok(),
            None => std::future::pending().await,
        }
    }

    /// Fires once `RETRY_INTERVAL` after the last activation attempt left
    /// addresses pending; otherwise never resolves, so the actor doesn't
    /// wake on a timer while fully settled.
    async fn retry_tick(&self) {
        if self.pending.is_empty() {
            std::future::pending().await
        } else {
            tokio::time::sleep(RETRY_INTERVAL).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use vip_controller_address::fake::FakeAddressManager;
    use vip_controller_advertiser::fake::FakeAdvertiser;
    use vip_controller_core::testing::Timeline;
    use vip_controller_core::Uid;

    fn snapshot(addrs: &[&str]) -> ServiceSnapshot {
        ServiceSnapshot {
            uid: Uid::new("u1"),
            name: "web".into(),
            namespace: "default".into(),
            traffic_policy: TrafficPolicy::Cluster,
            accepted: true,
            addresses: addrs.iter().map(|a| a.parse().unwrap()).collect(),
        }
    }

    fn deps(address: FakeAddressManager, advertiser: FakeAdvertiser) -> ActorDeps {
        ActorDeps {
            address: Arc::new(address),
            advertiser: Arc::new(advertiser),
            metrics: ActorMetrics::default(),
        }
    }

    #[tokio::test]
    async fn activates_immediately_without_election_or_local_policy() {
        let timeline = Timeline::new();
        let address = FakeAddressManager::with_timeline(timeline.clone());
        let advertiser = FakeAdvertiser::with_timeline(false, timeline.clone());
        let (signal, watch) = drain::channel();
        let handle = spawn(snapshot(&["10.0.0.8"]), ElectionHandle::None, None, deps(address.clone(), advertiser.clone()), watch);

        tokio::time::sleep(StdDuration::from_millis(10)).await;
        assert!(address.is_bound("10.0.0.8".parse().unwrap()));
        assert!(advertiser.announced_addresses().contains(&"10.0.0.8".parse().unwrap()));

        handle.shutdown().await;
        assert!(!address.is_bound("10.0.0.8".parse().unwrap()));
        drop(signal);
    }

    #[tokio::test]
    async fn withdraws_before_releasing_on_teardown() {
        let timeline = Timeline::new();
        let address = FakeAddressManager::with_timeline(timeline.clone());
        let advertiser = FakeAdvertiser::with_timeline(false, timeline.clone());
        let (signal, watch) = drain::channel();
        let handle = spawn(snapshot(&["10.0.0.9"]), ElectionHandle::None, None, deps(address, advertiser), watch);
        tokio::time::sleep(StdDuration::from_millis(10)).await;

        handle.shutdown().await;

        let events = timeline.events();
        let withdraw_idx = events
            .iter()
            .position(|e| matches!(e, vip_controller_core::testing::HostEvent::Withdrawn(_)))
            .expect("withdraw recorded");
        let release_idx = events
            .iter()
            .position(|e| matches!(e, vip_controller_core::testing::HostEvent::Released(_)))
            .expect("release recorded");
        assert!(withdraw_idx < release_idx);
        drop(signal);
    }

    #[tokio::test]
    async fn retries_after_assign_failure_without_marking_active() {
        let address = FakeAddressManager::new();
        let advertiser = FakeAdvertiser::new(false);
        let addr: IpAddr = "10.0.0.10".parse().unwrap();
        address.fail_next_assign(addr);
        let (signal, watch) = drain::channel();
        let handle = spawn(snapshot(&["10.0.0.10"]), ElectionHandle::None, None, deps(address.clone(), advertiser.clone()), watch);

        tokio::time::sleep(StdDuration::from_millis(10)).await;
        assert!(!address.is_bound(addr), "assign should have failed on the first attempt");

        tokio::time::sleep(RETRY_INTERVAL + StdDuration::from_millis(50)).await;
        assert!(address.is_bound(addr), "retry tick should have re-attempted assign");
        assert!(advertiser.announced_addresses().contains(&addr));

        handle.shutdown().await;
        drop(signal);
    }

    #[tokio::test]
    async fn immediate_cancel_tears_down_without_queued_shutdown() {
        let address = FakeAddressManager::new();
        let advertiser = FakeAdvertiser::new(false);
        let (signal, watch) = drain::channel();
        let handle = spawn(snapshot(&["10.0.0.11"]), ElectionHandle::None, None, deps(address.clone(), advertiser), watch);
        tokio::time::sleep(StdDuration::from_millis(10)).await;

        handle.cancel();
        handle.join().await;

        assert!(!address.is_bound("10.0.0.11".parse().unwrap()));
        drop(signal);
    }
}
