//! The VIP advertisement back-ends (component A): ARP, Route, and BGP,
//! dispatched through a single tagged enum rather than a trait object so
//! that each back-end's very different capability surface (cadence task,
//! netlink handle, peer pool) stays concrete at the call site.
#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod arp;
mod bgp;
pub mod error;
#[cfg(feature = "test-util")]
pub mod fake;
mod route;

use arp::ArpAdvertiser;
use bgp::BgpAdvertiser;
use error::AdvertiserError;
use route::RouteAdvertiser;
use std::net::IpAddr;
use std::time::Duration;
use vip_controller_core::AdvertiserMode;

/// A live advertisement back-end for one Service actor's interface.
/// Construction resolves the configured `AdvertiserMode` into the
/// concrete implementation; the rest of the actor only ever sees this enum.
pub enum Advertiser {
    Arp(ArpAdvertiser),
    Route(RouteAdvertiser),
    Bgp(BgpAdvertiser),
}

impl Advertiser {
    pub async fn new(
        mode: &AdvertiserMode,
        interface: &str,
        gratuitous_interval: Duration,
        vip_cidr_v4: u8,
        vip_cidr_v6: u8,
    ) -> Result<Self, AdvertiserError> {
        match mode {
            AdvertiserMode::Arp => Ok(Advertiser::Arp(ArpAdvertiser::new(interface, gratuitous_interval).await?)),
            AdvertiserMode::Route => Ok(Advertiser::Route(
                RouteAdvertiser::new(interface, vip_cidr_v4, vip_cidr_v6).await?,
            )),
            AdvertiserMode::Bgp { peers } => Ok(Advertiser::Bgp(BgpAdvertiser::new(peers).await?)),
        }
    }

    /// Whether this back-end must only run while its actor holds an active
    /// election lease.
    pub fn requires_leadership(&self) -> bool {
        matches!(self, Advertiser::Arp(_))
    }

    pub async fn announce(&self, addr: IpAddr) -> Result<(), AdvertiserError> {
        match self {
            Advertiser::Arp(a) => a.announce(addr).await,
            Advertiser::Route(a) => a.announce(addr).await,
            Advertiser::Bgp(a) => a.announce(addr).await,
        }
    }

    pub async fn withdraw(&self, addr: IpAddr) -> Result<(), AdvertiserError> {
        match self {
            Advertiser::Arp(a) => a.withdraw(addr).await,
            Advertiser::Route(a) => a.withdraw(addr).await,
            Advertiser::Bgp(a) => a.withdraw(addr).await,
        }
    }

    /// Stops any background tasks (ARP resend cadence, BGP peer probes).
    /// Idempotent; safe to call during actor teardown even if nothing was
    /// ever announced.
    pub async fn stop(&self) {
        match self {
            Advertiser::Arp(a) => a.stop().await,
            Advertiser::Route(a) => a.stop().await,
            Advertiser::Bgp(a) => a.stop().await,
        }
    }
}

/// The capability surface the Service Actor drives: implemented by
/// [`Advertiser`] against the real back-ends, and by
/// [`fake::FakeAdvertiser`] for property-style tests that don't require raw
/// sockets or real BGP peers.
#[async_trait::async_trait]
pub trait AdvertiserBackend: Send + Sync {
    fn requires_leadership(&self) -> bool;
    async fn announce(&self, addr: IpAddr) -> Result<(), AdvertiserError>;
    async fn withdraw(&self, addr: IpAddr) -> Result<(), AdvertiserError>;
    async fn stop(&self);
}

#[async_trait::async_trait]
impl AdvertiserBackend for Advertiser {
    fn requires_leadership(&self) -> bool {
        Advertiser::requires_leadership(self)
    }

    async fn announce(&self, addr: IpAddr) -> Result<(), AdvertiserError> {
        Advertiser::announce(self, addr).await
    }

    async fn withdraw(&self, addr: IpAddr) -> Result<(), AdvertiserError> {
        Advertiser::withdraw(self, addr).await
    }

    async fn stop(&self) {
        Advertiser::stop(self).await
    }
}
