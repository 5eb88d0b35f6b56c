use crate::config::{ClassFilterMode, Config};
use std::net::IpAddr;

/// A read-only view of the Service fields the filter cares about. Kept
/// separate from any `k8s-openapi` type so this stage stays a pure function
/// of its inputs and is testable without a cluster.
#[derive(Clone, Debug, Default)]
pub struct ServiceView<'a> {
    pub is_load_balancer: bool,
    pub ignore_annotation: bool,
    pub load_balancer_class: Option<&'a str>,
    pub addresses: &'a [IpAddr],
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterDecision {
    Accept,
    /// Not a `LoadBalancer` Service.
    WrongType,
    /// Carries `kube-vip.io/ignore=true`.
    Ignored,
    /// Rejected by the class filter.
    WrongClass,
    /// No VIP addresses assigned yet.
    NoAddresses,
}

impl FilterDecision {
    pub fn is_accept(self) -> bool {
        matches!(self, FilterDecision::Accept)
    }
}

/// Decides whether a Service is in scope for this controller instance.
///
/// Pure function of `(svc.type, svc.annotations, svc.lbClass,
/// svc.status.addresses)` and the process config — no I/O, no clock, so it
/// can be exercised directly from table tests and reused for the `Modified`
/// accept/reject diff in the Service Actor.
pub fn filter_decision(svc: &ServiceView<'_>, config: &Config) -> FilterDecision {
    if !svc.is_load_balancer {
        return FilterDecision::WrongType;
    }
    if svc.ignore_annotation {
        return FilterDecision::Ignored;
    }
    if !class_accepts(svc.load_balancer_class, config) {
        return FilterDecision::WrongClass;
    }
    if svc.addresses.is_empty() {
        return FilterDecision::NoAddresses;
    }
    FilterDecision::Accept
}

fn class_accepts(lb_class: Option<&str>, config: &Config) -> bool {
    match &config.class_filter {
        ClassFilterMode::NonLegacy => match lb_class {
            Some(class) => class == config.load_balancer_class_name,
            None => config.load_balancer_class_name.is_empty(),
        },
        ClassFilterMode::Legacy { reject_unclassed } => match lb_class {
            Some(class) => class == config.load_balancer_class_name,
            None => !reject_unclassed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn svc<'a>(
        is_lb: bool,
        ignore: bool,
        class: Option<&'a str>,
        addrs: &'a [IpAddr],
    ) -> ServiceView<'a> {
        ServiceView {
            is_load_balancer: is_lb,
            ignore_annotation: ignore,
            load_balancer_class: class,
            addresses: addrs,
        }
    }

    #[test]
    fn rejects_non_loadbalancer() {
        let config = test_config(ClassFilterMode::NonLegacy, "");
        let addrs = ["10.0.0.1".parse().unwrap()];
        assert_eq!(
            filter_decision(&svc(false, false, None, &addrs), &config),
            FilterDecision::WrongType
        );
    }

    #[test]
    fn rejects_ignore_annotation() {
        let config = test_config(ClassFilterMode::NonLegacy, "");
        let addrs = ["10.0.0.1".parse().unwrap()];
        assert_eq!(
            filter_decision(&svc(true, true, None, &addrs), &config),
            FilterDecision::Ignored
        );
    }

    #[test]
    fn rejects_empty_address_list() {
        let config = test_config(ClassFilterMode::NonLegacy, "");
        assert_eq!(
            filter_decision(&svc(true, false, None, &[]), &config),
            FilterDecision::NoAddresses
        );
    }

    #[test]
    fn non_legacy_accepts_matching_class_or_both_unset() {
        let config = test_config(ClassFilterMode::NonLegacy, "lb-class");
        let addrs = ["10.0.0.1".parse().unwrap()];
        assert!(filter_decision(&svc(true, false, Some("lb-class"), &addrs), &config).is_accept());
        assert_eq!(
            filter_decision(&svc(true, false, Some("other"), &addrs), &config),
            FilterDecision::WrongClass
        );

        let config = test_config(ClassFilterMode::NonLegacy, "");
        assert!(filter_decision(&svc(true, false, None, &addrs), &config).is_accept());
        assert_eq!(
            filter_decision(&svc(true, false, Some("other"), &addrs), &config),
            FilterDecision::WrongClass
        );
    }

    #[test]
    fn legacy_rejects_only_mismatched_class() {
        let config = test_config(
            ClassFilterMode::Legacy {
                reject_unclassed: false,
            },
            "lb-class",
        );
        let addrs = ["10.0.0.1".parse().unwrap()];
        assert!(filter_decision(&svc(true, false, None, &addrs), &config).is_accept());
        assert!(filter_decision(&svc(true, false, Some("lb-class"), &addrs), &config).is_accept());
        assert_eq!(
            filter_decision(&svc(true, false, Some("other"), &addrs), &config),
            FilterDecision::WrongClass
        );
    }

    #[test]
    fn legacy_class_only_rejects_unclassed() {
        let config = test_config(
            ClassFilterMode::Legacy {
                reject_unclassed: true,
            },
            "lb-class",
        );
        let addrs = ["10.0.0.1".parse().unwrap()];
        assert_eq!(
            filter_decision(&svc(true, false, None, &addrs), &config),
            FilterDecision::WrongClass
        );
    }
}
