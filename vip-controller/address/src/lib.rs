//! The Address Manager (component B): binds/unbinds VIPs on the node's
//! interface and probes for stale bindings left behind by a prior crash.
#![deny(warnings, rust_2018_idioms)]

pub mod error;
#[cfg(feature = "test-util")]
pub mod fake;

use error::AddressError;
use futures::TryStreamExt;
use ipnet::IpNet;
use rtnetlink::Handle;
use std::net::IpAddr;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// The capability surface the Service Actor drives: implemented by
/// [`AddressManager`] against the real kernel, and by
/// [`fake::FakeAddressManager`] against an in-memory host for property-style
/// tests that don't require a real interface or `CAP_NET_ADMIN`.
#[async_trait::async_trait]
pub trait AddressBackend: Send + Sync {
    async fn assign(&self, addr: IpAddr) -> Result<(), AddressError>;
    async fn release(&self, addr: IpAddr) -> Result<(), AddressError>;
    async fn garbage_collect(&self, addr: IpAddr) -> Result<bool, AddressError>;
}

#[async_trait::async_trait]
impl AddressBackend for AddressManager {
    async fn assign(&self, addr: IpAddr) -> Result<(), AddressError> {
        AddressManager::assign(self, addr).await
    }

    async fn release(&self, addr: IpAddr) -> Result<(), AddressError> {
        AddressManager::release(self, addr).await
    }

    async fn garbage_collect(&self, addr: IpAddr) -> Result<bool, AddressError> {
        AddressManager::garbage_collect(self, addr).await
    }
}

/// Owns exclusive access to one interface's address list. Shared (behind an
/// `Arc`) across every Service Actor bound to that interface, since binds
/// and unbinds on the same NIC must be serialized.
pub struct AddressManager {
    interface: String,
    ifindex: u32,
    handle: Handle,
    vip_cidr_v4: u8,
    vip_cidr_v6: u8,
    // Serializes bind/unbind so concurrent actors never race the kernel's
    // address table for the shared interface.
    lock: Mutex<()>,
}

impl AddressManager {
    pub async fn new(interface: &str, vip_cidr_v4: u8, vip_cidr_v6: u8) -> Result<Self, AddressError> {
        let (connection, handle, _) = rtnetlink::new_connection()?;
        tokio::spawn(connection);

        let mut links = handle.link().get().match_name(interface.to_string()).execute();
        let link = links
            .try_next()
            .await?
            .ok_or_else(|| AddressError::NoSuchInterface(interface.to_string()))?;

        Ok(Self {
            interface: interface.to_string(),
            ifindex: link.header.index,
            handle,
            vip_cidr_v4,
            vip_cidr_v6,
            lock: Mutex::new(()),
        })
    }

    /// Binds `addr` to the interface. Idempotent: a retry after the address
    /// is already present succeeds rather than erroring.
    #[instrument(skip(self), fields(interface = %self.interface))]
    pub async fn assign(&self, addr: IpAddr) -> Result<(), AddressError> {
        let _guard = self.lock.lock().await;
        if self.find(addr).await? {
            debug!(%addr, "address already assigned, skipping");
            return Ok(());
        }
        let prefix_len = self.prefix_len(addr);
        self.handle.address().add(self.ifindex, addr, prefix_len).execute().await?;
        Ok(())
    }

    /// Unbinds `addr` from the interface. Idempotent: a retry after the
    /// address is already absent succeeds rather than erroring.
    #[instrument(skip(self), fields(interface = %self.interface))]
    pub async fn release(&self, addr: IpAddr) -> Result<(), AddressError> {
        let _guard = self.lock.lock().await;
        let prefix_len = self.prefix_len(addr);
        let net = IpNet::new(addr, prefix_len).expect("prefix length validated at construction");
        let mut addresses = self.handle.address().get().set_link_index_filter(self.ifindex).execute();
        while let Some(message) = addresses.try_next().await? {
            if address_matches(&message, net) {
                self.handle.address().del(message).execute().await?;
                return Ok(());
            }
        }
        debug!(%addr, "address already absent, skipping");
        Ok(())
    }

    /// Probes whether `addr` is already present on the interface, used
    /// before an actor claims ownership to detect a stale binding left by a
    /// prior crash.
    #[instrument(skip(self), fields(interface = %self.interface))]
    pub async fn garbage_collect(&self, addr: IpAddr) -> Result<bool, AddressError> {
        self.find(addr).await
    }

    async fn find(&self, addr: IpAddr) -> Result<bool, AddressError> {
        let prefix_len = self.prefix_len(addr);
        let net = IpNet::new(addr, prefix_len).expect("prefix length validated at construction");
        let mut addresses = self.handle.address().get().set_link_index_filter(self.ifindex).execute();
        while let Some(message) = addresses.try_next().await? {
            if address_matches(&message, net) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn prefix_len(&self, addr: IpAddr) -> u8 {
        match addr {
            IpAddr::V4(_) => self.vip_cidr_v4,
            IpAddr::V6(_) => self.vip_cidr_v6,
        }
    }
}

fn address_matches(message: &rtnetlink::packet_route::address::AddressMessage, net: IpNet) -> bool {
    message.header.prefix_len == net.prefix_len()
        && message
            .attributes
            .iter()
            .any(|attribute| matches!(attribute, rtnetlink::packet_route::address::AddressAttribute::Address(a) if *a == net.addr()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtnetlink::packet_route::address::{AddressAttribute, AddressHeader, AddressMessage};
    use rtnetlink::packet_route::AddressFamily;

    fn message_for(addr: IpAddr, prefix_len: u8) -> AddressMessage {
        let mut message = AddressMessage::default();
        message.header = AddressHeader {
            family: if addr.is_ipv4() { AddressFamily::Inet } else { AddressFamily::Inet6 },
            prefix_len,
            ..Default::default()
        };
        message.attributes.push(AddressAttribute::Address(addr));
        message
    }

    #[test]
    fn matches_identical_address_and_prefix() {
        let addr: IpAddr = "10.0.0.5".parse().unwrap();
        let message = message_for(addr, 32);
        let net = IpNet::new(addr, 32).unwrap();
        assert!(address_matches(&message, net));
    }

    #[test]
    fn rejects_differing_prefix_length() {
        let addr: IpAddr = "10.0.0.5".parse().unwrap();
        let message = message_for(addr, 24);
        let net = IpNet::new(addr, 32).unwrap();
        assert!(!address_matches(&message, net));
    }

    #[test]
    fn rejects_differing_address() {
        let a: IpAddr = "10.0.0.5".parse().unwrap();
        let b: IpAddr = "10.0.0.6".parse().unwrap();
        let message = message_for(a, 32);
        let net = IpNet::new(b, 32).unwrap();
        assert!(!address_matches(&message, net));
    }
}
