#[derive(Debug, thiserror::Error)]
pub enum AdvertiserError {
    #[error("failed to open raw socket on {interface}: {source}")]
    Socket {
        interface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("netlink request failed: {0}")]
    Netlink(#[from] rtnetlink::Error),

    #[error("no interface named {0}")]
    NoSuchInterface(String),

    #[error("BGP peer {peer} unreachable: {source}")]
    PeerUnreachable {
        peer: std::net::IpAddr,
        #[source]
        source: std::io::Error,
    },
}
