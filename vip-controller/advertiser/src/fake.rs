//! An in-memory stand-in for [`crate::Advertiser`], used by the actor and
//! controller test suites to exercise the Service Actor's host programming
//! without raw sockets or BGP peers.
use crate::{error::AdvertiserError, AdvertiserBackend};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use vip_controller_core::testing::{HostEvent, Timeline};

/// A simulated advertiser shared across a test's actors. `requires_leadership`
/// is fixed at construction to model the ARP-vs-Route/BGP selection rule.
#[derive(Clone)]
pub struct FakeAdvertiser {
    requires_leadership: bool,
    announced: Arc<Mutex<HashSet<IpAddr>>>,
    timeline: Option<Timeline>,
}

impl FakeAdvertiser {
    pub fn new(requires_leadership: bool) -> Self {
        Self {
            requires_leadership,
            announced: Arc::new(Mutex::new(HashSet::new())),
            timeline: None,
        }
    }

    /// Shares `timeline` with any other fake back-end in the test so
    /// cross-capability call order can be asserted.
    pub fn with_timeline(requires_leadership: bool, timeline: Timeline) -> Self {
        Self {
            requires_leadership,
            announced: Arc::new(Mutex::new(HashSet::new())),
            timeline: Some(timeline),
        }
    }

    pub fn announced_addresses(&self) -> HashSet<IpAddr> {
        self.announced.lock().clone()
    }
}

#[async_trait::async_trait]
impl AdvertiserBackend for FakeAdvertiser {
    fn requires_leadership(&self) -> bool {
        self.requires_leadership
    }

    async fn announce(&self, addr: IpAddr) -> Result<(), AdvertiserError> {
        self.announced.lock().insert(addr);
        if let Some(timeline) = &self.timeline {
            timeline.record(HostEvent::Announced(addr));
        }
        Ok(())
    }

    async fn withdraw(&self, addr: IpAddr) -> Result<(), AdvertiserError> {
        self.announced.lock().remove(&addr);
        if let Some(timeline) = &self.timeline {
            timeline.record(HostEvent::Withdrawn(addr));
        }
        Ok(())
    }

    async fn stop(&self) {}
}
