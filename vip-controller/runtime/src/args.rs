use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use vip_controller_address::AddressManager;
use vip_controller_advertiser::Advertiser;
use vip_controller_core::{AdvertiserMode, BgpPeerConfig, ClassFilterMode, Config, ElectionTopology};
use vip_controller_k8s_actor::metrics::ActorMetrics;
use vip_controller_k8s_api::{watcher, Service, Watch};
use vip_controller_k8s_controller::election::ElectionConfig;
use vip_controller_k8s_controller::metrics::ControllerMetrics;
use vip_controller_k8s_controller::ServiceController;
use vip_controller_k8s_election::ElectionDriver;

const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);
const DEFAULT_RENEW_GRACE_PERIOD: Duration = Duration::from_secs(5);
const DEFAULT_ARP_GRATUITOUS_INTERVAL: Duration = Duration::from_secs(10);
const GLOBAL_LEASE_NAME: &str = "vip-controller-leader";
const PER_SERVICE_LEASE_PREFIX: &str = "vip-controller";

/// The process entrypoint: a `clap`-derived CLI covering namespace scoping,
/// class filtering, election topology, advertiser back-end selection, and
/// the usual `kubert` client/admin/log flags.
#[derive(Debug, Parser)]
#[clap(name = "vip-controller", about = "A VIP and LoadBalancer service controller")]
pub struct Args {
    #[clap(long, default_value = "vip_controller=info,warn", env = "VIP_CONTROLLER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Restricts the Service watch to one namespace; empty watches all.
    #[clap(long, default_value = "", env = "VIP_CONTROLLER_SERVICE_NAMESPACE")]
    service_namespace: String,

    /// Required `spec.loadBalancerClass` value; empty accepts unclassed Services.
    #[clap(long, default_value = "", env = "VIP_CONTROLLER_LOAD_BALANCER_CLASS_NAME")]
    load_balancer_class_name: String,

    /// Uses the legacy class filter (accept unless a differing class is set)
    /// instead of the non-legacy exact-match filter.
    #[clap(long, env = "VIP_CONTROLLER_LOAD_BALANCER_CLASS_LEGACY_HANDLING")]
    load_balancer_class_legacy_handling: bool,

    /// In legacy mode, additionally reject Services with no class at all.
    #[clap(long, env = "VIP_CONTROLLER_LOAD_BALANCER_CLASS_ONLY")]
    load_balancer_class_only: bool,

    /// One lease shared by every VIP on the process.
    #[clap(long, env = "VIP_CONTROLLER_ENABLE_LEADER_ELECTION")]
    enable_leader_election: bool,

    /// One lease per Service UID; takes precedence over `enable_leader_election`.
    #[clap(long, env = "VIP_CONTROLLER_ENABLE_SERVICES_ELECTION")]
    enable_services_election: bool,

    #[clap(long, env = "VIP_CONTROLLER_ENABLE_BGP")]
    enable_bgp: bool,

    #[clap(long, env = "VIP_CONTROLLER_ENABLE_ROUTING_TABLE")]
    enable_routing_table: bool,

    #[clap(long, env = "VIP_CONTROLLER_ENABLE_ARP")]
    enable_arp: bool,

    /// Comma-separated BGP peers: `address:remote_as:local_as:hold_time_secs`.
    #[clap(long, default_value = "", env = "VIP_CONTROLLER_BGP_PEERS")]
    bgp_peers: BgpPeers,

    #[clap(long, env = "VIP_CONTROLLER_ENABLE_ENDPOINT_SLICES")]
    enable_endpoint_slices: bool,

    #[clap(long, env = "NODE_NAME")]
    node_name: String,

    #[clap(long, default_value = "eth0", env = "VIP_CONTROLLER_INTERFACE")]
    interface: String,

    #[clap(long, default_value = "15", env = "VIP_CONTROLLER_LEASE_DURATION_SECS")]
    lease_duration_secs: u64,

    #[clap(long, default_value = "5", env = "VIP_CONTROLLER_RENEW_GRACE_PERIOD_SECS")]
    renew_grace_period_secs: u64,

    #[clap(long, default_value = "10", env = "VIP_CONTROLLER_ARP_GRATUITOUS_INTERVAL_SECS")]
    arp_gratuitous_interval_secs: u64,

    #[clap(long, default_value = "32", env = "VIP_CONTROLLER_VIP_CIDR_V4")]
    vip_cidr_v4: u8,

    #[clap(long, default_value = "128", env = "VIP_CONTROLLER_VIP_CIDR_V6")]
    vip_cidr_v6: u8,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let config = Arc::new(self.build_config()?);
        config.validate()?;

        let mut prom = prometheus_client::registry::Registry::default();
        let actor_metrics = ActorMetrics::register(&mut prom);
        let controller_metrics = ControllerMetrics::register(&mut prom);

        let mut runtime = kubert::Runtime::builder()
            .with_log(self.log_level, self.log_format)
            .with_admin(self.admin.into_builder().with_prometheus(prom))
            .with_client(self.client)
            .build()
            .await?;

        let client = runtime.client();

        let address = Arc::new(
            AddressManager::new(&config.interface, config.vip_cidr_v4, config.vip_cidr_v6)
                .await
                .map_err(anyhow::Error::from)?,
        );
        let advertiser = Arc::new(
            Advertiser::new(
                &config.advertiser,
                &config.interface,
                config.arp_gratuitous_interval,
                config.vip_cidr_v4,
                config.vip_cidr_v6,
            )
            .await
            .map_err(anyhow::Error::from)?,
        );

        let election = self.build_election(&config, client.clone()).await?;

        let controller = Arc::new(ServiceController::new(
            config.clone(),
            client.clone(),
            address,
            advertiser,
            election,
            actor_metrics,
            controller_metrics,
        ));

        let watcher_config = if config.service_namespace.is_empty() {
            kube::Api::<Service>::all(client.clone())
        } else {
            kube::Api::<Service>::namespaced(client.clone(), &config.service_namespace)
        };
        let stream = watcher(watcher_config, watcher::Config::default());
        let events = Watch::from(stream);

        // The immediate-cancel edge is available for embedders and tests;
        // the standalone binary only ever drives the graceful path via
        // `kubert`'s own shutdown signal handling.
        let cancel = CancellationToken::new();
        let drain = runtime.shutdown_handle();

        tokio::spawn(
            async move {
                if let Err(error) = controller.run(events, cancel, drain).await {
                    tracing::error!(%error, "service controller exited");
                }
            }
            .instrument(info_span!("controller")),
        );

        info!(interface = %config.interface, node_name = %config.node_name, "vip-controller started");

        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }

    fn build_config(&self) -> Result<Config> {
        let class_filter = if self.load_balancer_class_legacy_handling {
            ClassFilterMode::Legacy {
                reject_unclassed: self.load_balancer_class_only,
            }
        } else {
            ClassFilterMode::NonLegacy
        };

        let election = if self.enable_services_election {
            ElectionTopology::PerService
        } else if self.enable_leader_election {
            ElectionTopology::Global
        } else {
            ElectionTopology::None
        };

        let advertiser = match (self.enable_bgp, self.enable_routing_table, self.enable_arp) {
            (true, false, false) => AdvertiserMode::Bgp {
                peers: self.bgp_peers.0.clone(),
            },
            (false, true, false) => AdvertiserMode::Route,
            (false, false, true) => AdvertiserMode::Arp,
            _ => bail!("exactly one of --enable-bgp, --enable-routing-table, --enable-arp must be set"),
        };

        Ok(Config {
            service_namespace: self.service_namespace.clone(),
            load_balancer_class_name: self.load_balancer_class_name.clone(),
            class_filter,
            election,
            advertiser,
            enable_endpoint_slices: self.enable_endpoint_slices,
            node_name: self.node_name.clone(),
            interface: self.interface.clone(),
            lease_duration: Duration::from_secs(self.lease_duration_secs),
            renew_grace_period: Duration::from_secs(self.renew_grace_period_secs),
            arp_gratuitous_interval: Duration::from_secs(self.arp_gratuitous_interval_secs),
            vip_cidr_v4: self.vip_cidr_v4,
            vip_cidr_v6: self.vip_cidr_v6,
        })
    }

    async fn build_election(&self, config: &Config, client: kube::Client) -> Result<ElectionConfig> {
        match config.election {
            ElectionTopology::None => Ok(ElectionConfig::None),
            ElectionTopology::Global => {
                let driver = ElectionDriver::spawn(
                    client,
                    &config.service_namespace,
                    GLOBAL_LEASE_NAME,
                    &config.node_name,
                    config.lease_duration,
                    config.renew_grace_period,
                )
                .await?;
                Ok(ElectionConfig::Global(driver))
            }
            ElectionTopology::PerService => Ok(ElectionConfig::PerService {
                client,
                lease_namespace: config.service_namespace.clone(),
                lease_prefix: PER_SERVICE_LEASE_PREFIX.to_string(),
                holder_identity: config.node_name.clone(),
                lease_duration: config.lease_duration,
                renew_grace_period: config.renew_grace_period,
            }),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct BgpPeers(Vec<BgpPeerConfig>);

impl std::str::FromStr for BgpPeers {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        s.split(',').map(parse_bgp_peer).collect::<Result<Vec<_>>>().map(Self)
    }
}

fn parse_bgp_peer(spec: &str) -> Result<BgpPeerConfig> {
    let parts: Vec<&str> = spec.split(':').collect();
    let [address, remote_as, local_as, hold_time] = parts.as_slice() else {
        bail!("invalid BGP peer spec {spec:?}, expected address:remote_as:local_as:hold_time_secs");
    };
    Ok(BgpPeerConfig {
        address: address.parse()?,
        remote_as: remote_as.parse()?,
        local_as: local_as.parse()?,
        hold_time: Duration::from_secs(hold_time.parse()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bgp_peers_parses_to_none() {
        let peers: BgpPeers = "".parse().unwrap();
        assert!(peers.0.is_empty());
    }

    #[test]
    fn parses_one_bgp_peer() {
        let peers: BgpPeers = "10.0.0.1:65001:65000:90".parse().unwrap();
        assert_eq!(peers.0.len(), 1);
        assert_eq!(peers.0[0].remote_as, 65001);
        assert_eq!(peers.0[0].hold_time, Duration::from_secs(90));
    }

    #[test]
    fn parses_multiple_bgp_peers() {
        let peers: BgpPeers = "10.0.0.1:65001:65000:90,10.0.0.2:65002:65000:90".parse().unwrap();
        assert_eq!(peers.0.len(), 2);
    }

    #[test]
    fn rejects_malformed_peer_spec() {
        assert!("10.0.0.1:65001".parse::<BgpPeers>().is_err());
    }
}
