//! The controller's own metrics: one counter family
//! keyed by watch event type, registered the same way
//! [`vip_controller_k8s_actor::metrics::ActorMetrics`] registers its own
//! family against the shared process `Registry`.
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use vip_controller_k8s_api::ServiceEvent;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ServiceEventLabels {
    pub r#type: &'static str,
}

#[derive(Clone, Default)]
pub struct ControllerMetrics {
    count_service_watch_event: Family<ServiceEventLabels, Counter>,
}

impl ControllerMetrics {
    pub fn register(registry: &mut Registry) -> Self {
        let count_service_watch_event = Family::default();
        registry.register(
            "count_service_watch_event",
            "Count of Service watch events observed, by event type",
            count_service_watch_event.clone(),
        );
        Self { count_service_watch_event }
    }

    pub fn record<T>(&self, event: &ServiceEvent<T>) {
        let r#type = match event {
            ServiceEvent::Added(_) => "added",
            ServiceEvent::Modified(_) => "modified",
            ServiceEvent::Deleted(_) => "deleted",
        };
        self.count_service_watch_event.get_or_create(&ServiceEventLabels { r#type }).inc();
    }
}
