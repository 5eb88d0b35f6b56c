use k8s_openapi::api::core::v1::Endpoints;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use std::collections::HashSet;
use std::net::IpAddr;

/// Projects an `Endpoints` object to the addresses of ready subset members
/// whose `nodeName` matches this node.
pub fn endpoints(obj: &Endpoints, node_name: &str) -> HashSet<IpAddr> {
    obj.subsets
        .iter()
        .flatten()
        .flat_map(|subset| subset.addresses.iter().flatten())
        .filter(|address| address.node_name.as_deref() == Some(node_name))
        .filter_map(|address| address.ip.parse().ok())
        .collect()
}

/// Projects an `EndpointSlice` to the addresses of ready members whose
/// `nodeName` matches this node.
pub fn endpoint_slice(obj: &EndpointSlice, node_name: &str) -> HashSet<IpAddr> {
    obj.endpoints
        .iter()
        .filter(|endpoint| endpoint.conditions.as_ref().and_then(|c| c.ready).unwrap_or(true))
        .filter(|endpoint| endpoint.node_name.as_deref() == Some(node_name))
        .flat_map(|endpoint| endpoint.addresses.iter())
        .filter_map(|addr| addr.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset};
    use k8s_openapi::api::discovery::v1::{Endpoint, EndpointConditions};

    #[test]
    fn endpoints_filters_by_node() {
        let obj = Endpoints {
            subsets: Some(vec![EndpointSubset {
                addresses: Some(vec![
                    EndpointAddress {
                        ip: "10.0.0.1".into(),
                        node_name: Some("node-a".into()),
                        ..Default::default()
                    },
                    EndpointAddress {
                        ip: "10.0.0.2".into(),
                        node_name: Some("node-b".into()),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let local = endpoints(&obj, "node-a");
        assert_eq!(local, HashSet::from(["10.0.0.1".parse().unwrap()]));
    }

    #[test]
    fn endpoint_slice_requires_ready_and_local_node() {
        let obj = EndpointSlice {
            endpoints: vec![
                Endpoint {
                    addresses: vec!["10.0.0.3".into()],
                    conditions: Some(EndpointConditions { ready: Some(true), ..Default::default() }),
                    node_name: Some("node-a".into()),
                    ..Default::default()
                },
                Endpoint {
                    addresses: vec!["10.0.0.4".into()],
                    conditions: Some(EndpointConditions { ready: Some(false), ..Default::default() }),
                    node_name: Some("node-a".into()),
                    ..Default::default()
                },
                Endpoint {
                    addresses: vec!["10.0.0.5".into()],
                    conditions: Some(EndpointConditions { ready: Some(true), ..Default::default() }),
                    node_name: Some("node-b".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let local = endpoint_slice(&obj, "node-a");
        assert_eq!(local, HashSet::from(["10.0.0.3".parse().unwrap()]));
    }
}
