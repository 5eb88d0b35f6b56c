#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod filter;
mod snapshot;
#[cfg(feature = "test-util")]
pub mod testing;

pub use self::{
    config::{AdvertiserMode, BgpPeerConfig, ClassFilterMode, Config, ElectionTopology},
    error::ConfigError,
    filter::{filter_decision, FilterDecision, ServiceView},
    snapshot::{ServiceSnapshot, SnapshotDiff, TrafficPolicy, Uid},
};

pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};
