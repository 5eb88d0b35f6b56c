#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("no interface named {0}")]
    NoSuchInterface(String),

    #[error("netlink request failed: {0}")]
    Netlink(#[from] rtnetlink::Error),

    #[error("failed to open netlink connection: {0}")]
    Connection(#[from] std::io::Error),
}
