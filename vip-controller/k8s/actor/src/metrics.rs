//! Per-actor metrics, registered once by the process and
//! shared (via clone — every `Family`/`Counter` handle is itself an `Arc`)
//! by every Service Actor, following the `IndexMetrics` pattern of
//! registering one struct of label-keyed families against a shared
//! `prometheus_client::registry::Registry` at startup.
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HostProgrammingLabels {
    pub namespace: String,
    pub name: String,
    pub operation: &'static str,
}

#[derive(Clone, Default)]
pub struct ActorMetrics {
    host_programming_failures: Family<HostProgrammingLabels, Counter>,
}

impl ActorMetrics {
    pub fn register(registry: &mut Registry) -> Self {
        let host_programming_failures = Family::default();
        registry.register(
            "host_programming_failures",
            "Count of failed assign/release/announce/withdraw calls against a VIP's host back-end",
            host_programming_failures.clone(),
        );
        Self { host_programming_failures }
    }

    pub fn record_failure(&self, namespace: &str, name: &str, operation: &'static str) {
        self.host_programming_failures
            .get_or_create(&HostProgrammingLabels {
                namespace: namespace.to_string(),
                name: name.to_string(),
                operation,
            })
            .inc();
    }
}
