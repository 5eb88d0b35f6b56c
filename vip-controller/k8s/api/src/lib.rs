#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "test-util")]
pub mod fake;
pub mod watch;

pub use k8s_openapi::{
    api::{
        coordination::v1::Lease,
        core::v1::{Endpoints, LoadBalancerIngress, LoadBalancerStatus, Node, Service, ServiceSpec, ServiceStatus},
        discovery::v1::{Endpoint, EndpointSlice},
    },
    apimachinery::pkg::apis::meta::v1::Time,
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, Patch, PatchParams, Resource, ResourceExt},
    error::ErrorResponse,
    runtime::watcher,
    Client, Error,
};

pub use self::watch::{EventSource, ServiceEvent, Watch};
