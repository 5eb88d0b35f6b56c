/// Fatal, construction-time configuration errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("the ARP advertiser requires an active election (global or per-service)")]
    ArpRequiresElection,

    #[error("invalid {family} VIP CIDR length")]
    InvalidCidr { family: &'static str },
}
