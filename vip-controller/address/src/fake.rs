//! An in-memory stand-in for [`crate::AddressManager`], used by the actor
//! and controller test suites to exercise the Service Actor's host
//! programming without a real interface or `CAP_NET_ADMIN`.
use crate::{error::AddressError, AddressBackend};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use vip_controller_core::testing::{HostEvent, Timeline};

/// A simulated host's bound-address table for one interface. Cloning shares
/// the same underlying table, so a test can construct one `FakeAddressManager`,
/// clone it into an actor, and assert on the bindings it observes.
#[derive(Clone, Default)]
pub struct FakeAddressManager {
    bound: Arc<Mutex<HashSet<IpAddr>>>,
    /// When set, every `assign` fails until the address is removed from
    /// this set — used to exercise the host-programming-failure retry
    /// path deterministically.
    fail_assign: Arc<Mutex<HashSet<IpAddr>>>,
    timeline: Option<Timeline>,
}

impl FakeAddressManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares `timeline` with any other fake back-end in the test so
    /// cross-capability call order can be asserted.
    pub fn with_timeline(timeline: Timeline) -> Self {
        Self {
            timeline: Some(timeline),
            ..Self::default()
        }
    }

    pub fn bound_addresses(&self) -> HashSet<IpAddr> {
        self.bound.lock().clone()
    }

    pub fn is_bound(&self, addr: IpAddr) -> bool {
        self.bound.lock().contains(&addr)
    }

    /// Pre-seeds the table as if a prior process had left `addr` bound,
    /// without going through `assign` — exercises `garbage_collect`.
    pub fn seed_stale(&self, addr: IpAddr) {
        self.bound.lock().insert(addr);
    }

    /// Makes the next `assign(addr)` call fail with a synthetic error.
    pub fn fail_next_assign(&self, addr: IpAddr) {
        self.fail_assign.lock().insert(addr);
    }
}

#[async_trait::async_trait]
impl AddressBackend for FakeAddressManager {
    async fn assign(&self, addr: IpAddr) -> Result<(), AddressError> {
        if self.fail_assign.lock().remove(&addr) {
            return Err(AddressError::NoSuchInterface("fake-injected-failure".into()));
        }
        self.bound.lock().insert(addr);
        if let Some(timeline) = &self.timeline {
            timeline.record(HostEvent::Assigned(addr));
        }
        Ok(())
    }

    async fn release(&self, addr: IpAddr) -> Result<(), AddressError> {
        self.bound.lock().remove(&addr);
        if let Some(timeline) = &self.timeline {
            timeline.record(HostEvent::Released(addr));
        }
        Ok(())
    }

    async fn garbage_collect(&self, addr: IpAddr) -> Result<bool, AddressError> {
        Ok(self.bound.lock().contains(&addr))
    }
}
