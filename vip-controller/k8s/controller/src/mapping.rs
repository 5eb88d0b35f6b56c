//! Maps a raw `k8s_openapi` `Service` object down to the pure, cluster-free
//! types the core filter and state-machine logic operate on.
use std::net::IpAddr;

use vip_controller_core::{filter_decision, Config, FilterDecision, ServiceSnapshot, ServiceView, TrafficPolicy, Uid};
use vip_controller_k8s_api::{ResourceExt, Service};

/// `kube-vip.io/ignore=true` unconditionally skips a service.
const IGNORE_ANNOTATION: &str = "kube-vip.io/ignore";
/// Fallback source of VIP addresses when neither `status.loadBalancer.ingress`
/// nor `spec.loadBalancerIP` is populated yet.
const ADDRESS_ANNOTATION: &str = "kube-vip.io/loadbalancerIPs";

/// The classification of one `Service` object: its filter decision plus the
/// `ServiceSnapshot` the rest of the system acts on regardless of that
/// decision (a rejected snapshot still has `accepted=false` recorded so a
/// later accept/reject flip can be diffed against it).
pub struct Classified {
    pub decision: FilterDecision,
    pub snapshot: ServiceSnapshot,
}

/// Runs the filter and builds the snapshot for one Service object observed
/// in the configured namespace.
pub fn classify(svc: &Service, config: &Config) -> Classified {
    let uid = Uid::new(svc.uid().unwrap_or_default());
    let name = svc.name_any();
    let namespace = svc.namespace().unwrap_or_default();
    let addresses = service_addresses(svc);

    let is_load_balancer = svc
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        .map(|t| t == "LoadBalancer")
        .unwrap_or(false);
    let ignore_annotation = svc
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(IGNORE_ANNOTATION))
        .map(|v| v == "true")
        .unwrap_or(false);
    let load_balancer_class = svc.spec.as_ref().and_then(|spec| spec.load_balancer_class.as_deref());
    let traffic_policy = match svc.spec.as_ref().and_then(|spec| spec.external_traffic_policy.as_deref()) {
        Some("Local") => TrafficPolicy::Local,
        _ => TrafficPolicy::Cluster,
    };

    let view = ServiceView {
        is_load_balancer,
        ignore_annotation,
        load_balancer_class,
        addresses: &addresses,
    };
    let decision = filter_decision(&view, config);

    let snapshot = ServiceSnapshot {
        uid,
        name,
        namespace,
        traffic_policy,
        accepted: decision.is_accept(),
        addresses,
    };

    Classified { decision, snapshot }
}

/// Resolves a service's VIP addresses: `status.loadBalancer.ingress` takes
/// priority, then `spec.loadBalancerIP`, then the `kube-vip.io/loadbalancerIPs`
/// annotation (comma-separated) as a last resort for statically-assigned VIPs.
fn service_addresses(svc: &Service) -> Vec<IpAddr> {
    let from_status: Vec<IpAddr> = svc
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| ingress.iter().filter_map(|i| i.ip.as_deref()?.parse().ok()).collect())
        .unwrap_or_default();
    if !from_status.is_empty() {
        return from_status;
    }

    let from_spec: Option<IpAddr> = svc.spec.as_ref().and_then(|spec| spec.load_balancer_ip.as_deref()).and_then(|ip| ip.parse().ok());
    if let Some(addr) = from_spec {
        return vec![addr];
    }

    svc.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ADDRESS_ANNOTATION))
        .map(|csv| csv.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vip_controller_core::{Config, ElectionTopology};
    use vip_controller_k8s_api::{LoadBalancerIngress, LoadBalancerStatus, ObjectMeta, ServiceSpec, ServiceStatus};

    fn config() -> Config {
        Config {
            service_namespace: String::new(),
            load_balancer_class_name: String::new(),
            class_filter: vip_controller_core::ClassFilterMode::NonLegacy,
            election: ElectionTopology::PerService,
            advertiser: vip_controller_core::AdvertiserMode::Route,
            enable_endpoint_slices: true,
            node_name: "node-a".into(),
            interface: "eth0".into(),
            lease_duration: std::time::Duration::from_secs(15),
            renew_grace_period: std::time::Duration::from_secs(5),
            arp_gratuitous_interval: std::time::Duration::from_secs(3),
            vip_cidr_v4: 32,
            vip_cidr_v6: 128,
        }
    }

    fn svc(annotations: BTreeMap<String, String>, ingress_ip: Option<&str>) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("web".into()),
                namespace: Some("default".into()),
                uid: Some("u1".into()),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".into()),
                ..Default::default()
            }),
            status: ingress_ip.map(|ip| ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![LoadBalancerIngress {
                        ip: Some(ip.to_string()),
                        ..Default::default()
                    }]),
                }),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn ignore_annotation_rejects_regardless_of_type() {
        let mut annotations = BTreeMap::new();
        annotations.insert(IGNORE_ANNOTATION.to_string(), "true".to_string());
        let classified = classify(&svc(annotations, Some("10.0.0.5")), &config());
        assert_eq!(classified.decision, FilterDecision::Ignored);
        assert!(!classified.snapshot.accepted);
    }

    #[test]
    fn accepts_loadbalancer_with_status_address() {
        let classified = classify(&svc(BTreeMap::new(), Some("10.0.0.5")), &config());
        assert!(classified.decision.is_accept());
        assert_eq!(classified.snapshot.addresses, vec!["10.0.0.5".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn no_addresses_is_rejected() {
        let classified = classify(&svc(BTreeMap::new(), None), &config());
        assert_eq!(classified.decision, FilterDecision::NoAddresses);
    }
}
