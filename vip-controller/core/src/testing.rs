//! Shared fake-host primitives used by the `test-util` feature of the
//! address and advertiser crates, so a test can observe one interleaved
//! call sequence across both capabilities — needed for the "S4 Modified
//! replaces VIPs" ordering property: all of the old address set must
//! be withdrawn/released before any of the new set is assigned/announced.
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;

/// One observed call against a fake back-end, in the order it happened.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HostEvent {
    Assigned(IpAddr),
    Released(IpAddr),
    Announced(IpAddr),
    Withdrawn(IpAddr),
}

/// A cloneable handle onto one shared, ordered log of [`HostEvent`]s.
#[derive(Clone, Default)]
pub struct Timeline(Arc<Mutex<Vec<HostEvent>>>);

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: HostEvent) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.0.lock().clone()
    }
}
