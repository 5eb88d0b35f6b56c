//! Resolves the process's configured [`ElectionTopology`] into a concrete
//! [`ElectionHandle`] for each Service Actor (per-service takes precedence
//! when both knobs are enabled — by the time `ElectionTopology` reaches
//! this crate that precedence is already resolved, so this module only
//! has to build what the enum names).
use std::time::Duration;

use vip_controller_k8s_actor::ElectionHandle;
use vip_controller_k8s_api::Client;
use vip_controller_k8s_election::{per_service_lease_name, ElectionDriver, ElectionError};

/// One lease-acquisition strategy, fixed for the lifetime of the process.
pub enum ElectionConfig {
    None,
    /// A single lease shared by every actor; `driver` is the one scope that
    /// renews it, constructed once at startup.
    Global(ElectionDriver),
    PerService {
        client: Client,
        lease_namespace: String,
        lease_prefix: String,
        holder_identity: String,
        lease_duration: Duration,
        renew_grace_period: Duration,
    },
}

impl ElectionConfig {
    /// Builds (or clones a view onto) the election handle for one Service.
    /// Only the `PerService` variant does I/O — it creates the lease object
    /// if absent and spawns a claimant for it.
    pub async fn handle_for(&self, namespace: &str, name: &str) -> Result<ElectionHandle, ElectionError> {
        match self {
            ElectionConfig::None => Ok(ElectionHandle::None),
            ElectionConfig::Global(driver) => Ok(ElectionHandle::Shared(driver.observer())),
            ElectionConfig::PerService {
                client,
                lease_namespace,
                lease_prefix,
                holder_identity,
                lease_duration,
                renew_grace_period,
            } => {
                let lease_name = per_service_lease_name(lease_prefix, namespace, name);
                let driver = ElectionDriver::spawn(
                    client.clone(),
                    lease_namespace,
                    &lease_name,
                    holder_identity,
                    *lease_duration,
                    *renew_grace_period,
                )
                .await?;
                Ok(ElectionHandle::Owned(driver))
            }
        }
    }
}
