use crate::error::AdvertiserError;
use futures::TryStreamExt;
use rtnetlink::Handle;
use std::net::IpAddr;
use tracing::{debug, instrument};

/// `EEXIST`, used to make VIP assignment idempotent without pulling in the
/// `libc` crate solely for one constant.
const EEXIST: i32 = 17;

/// Advertises a VIP by installing a host route for it pointing at the local
/// interface, letting the upstream routing fabric (IGP/route-reflection)
/// propagate reachability — no ARP cadence, no BGP session, multipath-safe.
/// Does not touch the interface's own address set; that is the Address
/// Manager's job and happens independently via `self.address.assign()`.
///
/// Grounded on the route-install/uninstall pattern in
/// `holo-routing/src/netlink.rs`'s `ip_route_install`/`ip_route_uninstall`:
/// build a `handle.route().add()` request for the destination prefix and
/// output interface, then re-use the same request's message with
/// `handle.route().del(..)` to remove it.
pub struct RouteAdvertiser {
    interface: String,
    ifindex: u32,
    handle: Handle,
    vip_cidr_v4: u8,
    vip_cidr_v6: u8,
}

impl RouteAdvertiser {
    pub async fn new(interface: &str, vip_cidr_v4: u8, vip_cidr_v6: u8) -> Result<Self, AdvertiserError> {
        let (connection, handle, _) = rtnetlink::new_connection().map_err(|source| AdvertiserError::Socket {
            interface: interface.to_string(),
            source,
        })?;
        tokio::spawn(connection);

        let mut links = handle.link().get().match_name(interface.to_string()).execute();
        let link = links
            .try_next()
            .await?
            .ok_or_else(|| AdvertiserError::NoSuchInterface(interface.to_string()))?;

        Ok(Self {
            interface: interface.to_string(),
            ifindex: link.header.index,
            handle,
            vip_cidr_v4,
            vip_cidr_v6,
        })
    }

    #[instrument(skip(self), fields(interface = %self.interface))]
    pub async fn announce(&self, addr: IpAddr) -> Result<(), AdvertiserError> {
        let prefix_len = self.prefix_len(addr);
        debug!(%addr, prefix_len, "installing host route for VIP");
        let result = match addr {
            IpAddr::V4(v4) => {
                self.handle
                    .route()
                    .add()
                    .v4()
                    .destination_prefix(v4, prefix_len)
                    .output_interface(self.ifindex)
                    .execute()
                    .await
            }
            IpAddr::V6(v6) => {
                self.handle
                    .route()
                    .add()
                    .v6()
                    .destination_prefix(v6, prefix_len)
                    .output_interface(self.ifindex)
                    .execute()
                    .await
            }
        };
        match result {
            Ok(()) => Ok(()),
            // Idempotent: re-announcing an address already present is not
            // an error (actor restarts, reconnect-replays).
            Err(rtnetlink::Error::NetlinkError(message)) if message.code == Some(-EEXIST) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    #[instrument(skip(self), fields(interface = %self.interface))]
    pub async fn withdraw(&self, addr: IpAddr) -> Result<(), AdvertiserError> {
        let prefix_len = self.prefix_len(addr);
        match addr {
            IpAddr::V4(v4) => {
                let mut request = self.handle.route().add().v4().destination_prefix(v4, prefix_len).output_interface(self.ifindex);
                self.handle.route().del(request.message_mut().clone()).execute().await?;
            }
            IpAddr::V6(v6) => {
                let mut request = self.handle.route().add().v6().destination_prefix(v6, prefix_len).output_interface(self.ifindex);
                self.handle.route().del(request.message_mut().clone()).execute().await?;
            }
        }
        Ok(())
    }

    pub async fn stop(&self) {}

    fn prefix_len(&self, addr: IpAddr) -> u8 {
        match addr {
            IpAddr::V4(_) => self.vip_cidr_v4,
            IpAddr::V6(_) => self.vip_cidr_v6,
        }
    }
}
