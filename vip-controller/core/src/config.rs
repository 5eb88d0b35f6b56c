use crate::error::ConfigError;
use std::time::Duration;

/// Selects which class filter governs acceptance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClassFilterMode {
    /// Accept iff `svc.lbClass == config.lbClassName`, or both are unset.
    NonLegacy,
    /// Accept unless `svc.lbClass` is set and differs from
    /// `config.lbClassName`; `reject_unclassed` additionally rejects
    /// Services with no class at all.
    Legacy { reject_unclassed: bool },
}

/// The primary VIP-advertisement back-end. Exactly one is selected
/// per process; BGP and Route may additionally run without an election
/// (multipath advertising).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvertiserMode {
    Arp,
    Route,
    Bgp { peers: Vec<BgpPeerConfig> },
}

impl AdvertiserMode {
    /// Whether this back-end is only safe to run under an active election
    /// ("selection rule"). ARP must never run on more than one node at
    /// once; Route and BGP support multipath.
    pub fn requires_leadership(&self) -> bool {
        matches!(self, AdvertiserMode::Arp)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BgpPeerConfig {
    pub address: std::net::IpAddr,
    pub remote_as: u32,
    pub local_as: u32,
    pub hold_time: Duration,
}

/// Which election topology an actor uses, resolved once at startup —
/// per-service takes precedence when both are enabled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ElectionTopology {
    /// No leader election; legal only when the advertiser mode does not
    /// require leadership.
    None,
    /// One lease shared by every VIP on the process.
    Global,
    /// One lease per Service UID.
    PerService,
}

/// Process-scoped configuration, immutable after start.
#[derive(Clone, Debug)]
pub struct Config {
    pub service_namespace: String,
    pub load_balancer_class_name: String,
    pub class_filter: ClassFilterMode,
    pub election: ElectionTopology,
    pub advertiser: AdvertiserMode,
    pub enable_endpoint_slices: bool,
    pub node_name: String,
    pub interface: String,
    pub lease_duration: Duration,
    pub renew_grace_period: Duration,
    pub arp_gratuitous_interval: Duration,
    pub vip_cidr_v4: u8,
    pub vip_cidr_v6: u8,
}

impl Config {
    /// Validates cross-field invariants that CLI flag parsing alone cannot
    /// express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.election == ElectionTopology::None && self.advertiser.requires_leadership() {
            return Err(ConfigError::ArpRequiresElection);
        }
        if self.vip_cidr_v4 == 0 || self.vip_cidr_v4 > 32 {
            return Err(ConfigError::InvalidCidr { family: "v4" });
        }
        if self.vip_cidr_v6 == 0 || self.vip_cidr_v6 > 128 {
            return Err(ConfigError::InvalidCidr { family: "v6" });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config(class_filter: ClassFilterMode, lb_class_name: &str) -> Config {
    Config {
        service_namespace: String::new(),
        load_balancer_class_name: lb_class_name.to_string(),
        class_filter,
        election: ElectionTopology::PerService,
        advertiser: AdvertiserMode::Route,
        enable_endpoint_slices: true,
        node_name: "node-a".into(),
        interface: "eth0".into(),
        lease_duration: Duration::from_secs(15),
        renew_grace_period: Duration::from_secs(5),
        arp_gratuitous_interval: Duration::from_secs(3),
        vip_cidr_v4: 32,
        vip_cidr_v6: 128,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arp_without_election_is_illegal() {
        let mut config = test_config(ClassFilterMode::NonLegacy, "");
        config.election = ElectionTopology::None;
        config.advertiser = AdvertiserMode::Arp;
        assert_eq!(config.validate(), Err(ConfigError::ArpRequiresElection));
    }

    #[test]
    fn bgp_without_election_is_legal() {
        let mut config = test_config(ClassFilterMode::NonLegacy, "");
        config.election = ElectionTopology::None;
        config.advertiser = AdvertiserMode::Bgp { peers: vec![] };
        assert!(config.validate().is_ok());
    }
}
