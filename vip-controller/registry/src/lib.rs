//! The Instance Registry (component G): a concurrent map of Service UID to
//! live actor handle, with a parallel snapshot map used to diff incoming
//! `Modified` events against what was last dispatched.
#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use vip_controller_core::{ServiceSnapshot, Uid};

/// Generic over the actor handle type `H` so this crate never needs to
/// depend on the actor implementation (a reader-writer-locked map per key
/// dimension, the same shape as other per-resource indexes in this codebase).
#[derive(Clone)]
pub struct Registry<H> {
    actors: Arc<RwLock<HashMap<Uid, H>>>,
    snapshots: Arc<RwLock<HashMap<Uid, ServiceSnapshot>>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            actors: Arc::new(RwLock::new(HashMap::new())),
            snapshots: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<H: Clone> Registry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Load`: returns the actor handle for `uid`, if any.
    pub fn load(&self, uid: &Uid) -> Option<H> {
        self.actors.read().get(uid).cloned()
    }

    /// `Store`: inserts or replaces the actor handle and last-seen snapshot
    /// for `uid` in one atomic step from the caller's point of view.
    pub fn store(&self, uid: Uid, handle: H, snapshot: ServiceSnapshot) {
        self.actors.write().insert(uid.clone(), handle);
        self.snapshots.write().insert(uid, snapshot);
    }

    /// `Delete`: removes `uid` from both maps. A no-op if absent.
    pub fn delete(&self, uid: &Uid) {
        self.actors.write().remove(uid);
        self.snapshots.write().remove(uid);
    }

    /// The last snapshot stored for `uid`, used to diff an incoming
    /// `Modified` event.
    pub fn last_snapshot(&self, uid: &Uid) -> Option<ServiceSnapshot> {
        self.snapshots.read().get(uid).cloned()
    }

    /// `Find`: the existing entry by UID, falling back to matching address
    /// sets across all known snapshots — used during modification races
    /// where a UID briefly disagrees with its own prior snapshot.
    pub fn find(&self, uid: &Uid, addresses: &[std::net::IpAddr]) -> Option<H> {
        if let Some(handle) = self.load(uid) {
            return Some(handle);
        }
        let matching_uid = {
            let snapshots = self.snapshots.read();
            snapshots
                .iter()
                .find(|(_, snapshot)| snapshot.addresses == addresses)
                .map(|(uid, _)| uid.clone())?
        };
        self.load(&matching_uid)
    }

    pub fn len(&self) -> usize {
        self.actors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns every handle currently registered, used by the
    /// controller's whole-process shutdown path to fan cancellation out
    /// across every live actor.
    pub fn drain(&self) -> Vec<H> {
        self.snapshots.write().clear();
        self.actors.write().drain().map(|(_, handle)| handle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vip_controller_core::TrafficPolicy;

    fn snapshot(uid: Uid, addresses: Vec<std::net::IpAddr>) -> ServiceSnapshot {
        ServiceSnapshot {
            uid,
            name: "svc".into(),
            namespace: "default".into(),
            traffic_policy: TrafficPolicy::Cluster,
            accepted: true,
            addresses,
        }
    }

    #[test]
    fn store_then_load_roundtrips() {
        let registry: Registry<&'static str> = Registry::new();
        let uid = Uid::new("a");
        registry.store(uid.clone(), "handle-a", snapshot(uid.clone(), vec![]));
        assert_eq!(registry.load(&uid), Some("handle-a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn delete_removes_both_maps() {
        let registry: Registry<&'static str> = Registry::new();
        let uid = Uid::new("a");
        registry.store(uid.clone(), "handle-a", snapshot(uid.clone(), vec![]));
        registry.delete(&uid);
        assert_eq!(registry.load(&uid), None);
        assert_eq!(registry.last_snapshot(&uid), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn find_falls_back_to_matching_addresses() {
        let registry: Registry<&'static str> = Registry::new();
        let uid = Uid::new("a");
        let addr: std::net::IpAddr = "10.0.0.1".parse().unwrap();
        registry.store(uid.clone(), "handle-a", snapshot(uid, vec![addr]));

        let other_uid = Uid::new("b");
        assert_eq!(registry.find(&other_uid, &[addr]), Some("handle-a"));
    }

    #[test]
    fn find_returns_none_when_nothing_matches() {
        let registry: Registry<&'static str> = Registry::new();
        let addr: std::net::IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(registry.find(&Uid::new("a"), &[addr]), None);
    }
}
