//! The Election Driver (component C): wraps `kubert::lease::LeaseManager`
//! to turn lease-holder churn into `Acquired`/`Lost` transitions a Service
//! Actor can `await`, with global and per-service lease naming.
#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;
pub mod naming;

use error::ElectionError;
use k8s_openapi::api::coordination::v1::Lease;
use kube::api::{Patch, PatchParams};
use kube::{Client, ResourceExt};
use kubert::lease::{Claim, ClaimParams, LeaseManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

pub use naming::per_service_lease_name;

/// A leadership transition observed on a lease, delivered via two
/// callbacks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
    Acquired,
    Lost,
}

/// A read-only view onto one lease's claim, trackable independently by
/// many observers (e.g. every actor sharing a global election). Cloning a
/// `tokio::sync::watch::Receiver` is what makes this cheap: each clone
/// tracks its own "last seen" position without contending on the driver.
pub struct ElectionObserver {
    holder_identity: String,
    claims: watch::Receiver<Arc<Claim>>,
    was_leader: bool,
}

impl ElectionObserver {
    pub fn is_leader(&self) -> bool {
        self.claims.borrow().holder == self.holder_identity
    }

    /// Awaits the next `Acquired`/`Lost` transition, skipping claim updates
    /// that don't change this holder's leadership status (e.g. a renewal by
    /// the same already-leading node).
    pub async fn next_transition(&mut self) -> Transition {
        loop {
            if self.claims.changed().await.is_err() {
                // The claimant task exited; treat as losing leadership and
                // keep returning `Lost` so callers tear down cleanly.
                if self.was_leader {
                    self.was_leader = false;
                    return Transition::Lost;
                }
                std::future::pending::<()>().await;
            }
            let is_leader = self.is_leader();
            if is_leader != self.was_leader {
                self.was_leader = is_leader;
                return if is_leader { Transition::Acquired } else { Transition::Lost };
            }
        }
    }
}

/// Drives one lease's `Follower -> Candidate -> Leader -> Follower` cycle
/// for this process's configured holder identity.
pub struct ElectionDriver {
    lease_name: String,
    observer: ElectionObserver,
    // The claimant task keeps renewing independently of this handle; we
    // abort it explicitly on `release` rather than let the lease merely
    // expire, since that is the best-effort, release-before-timeout
    // relinquish behavior callers expect.
    claimant: JoinHandle<()>,
}

impl ElectionDriver {
    /// Ensures the named `Lease` object exists, then spawns a claimant for
    /// `holder_identity` against it.
    #[instrument(skip(client), fields(lease_name, namespace))]
    pub async fn spawn(
        client: Client,
        namespace: &str,
        lease_name: &str,
        holder_identity: &str,
        lease_duration: Duration,
        renew_grace_period: Duration,
    ) -> Result<Self, ElectionError> {
        let api = kube::Api::<Lease>::namespaced(client, namespace);

        let lease = Lease {
            metadata: kube::api::ObjectMeta {
                name: Some(lease_name.to_string()),
                namespace: Some(namespace.to_string()),
                // A resource version of "0" means "create only if absent".
                resource_version: Some("0".to_string()),
                ..Default::default()
            },
            spec: None,
        };
        match api
            .patch(
                lease_name,
                &PatchParams {
                    field_manager: Some("vip-controller".to_string()),
                    ..Default::default()
                },
                &Patch::Apply(lease),
            )
            .await
        {
            Ok(lease) => info!(name = %lease.name_any(), "created lease"),
            Err(kube::Error::Api(_)) => tracing::debug!("lease already exists"),
            Err(error) => return Err(ElectionError::Lease(lease_name.to_string(), error)),
        }

        let params = ClaimParams {
            lease_duration,
            renew_grace_period,
        };
        let (claims, claimant) = LeaseManager::init(api, lease_name)
            .await
            .map_err(|error| ElectionError::Spawn(error.into()))?
            .spawn(holder_identity, params)
            .await
            .map_err(|error| ElectionError::Spawn(error.into()))?;

        let was_leader = claims.borrow().holder == holder_identity;
        Ok(Self {
            lease_name: lease_name.to_string(),
            observer: ElectionObserver {
                holder_identity: holder_identity.to_string(),
                claims,
                was_leader,
            },
            claimant,
        })
    }

    /// Stops renewing this lease. Best-effort: the claimant task is aborted
    /// immediately rather than waiting for its lease to lapse naturally.
    pub fn release(&self) {
        self.claimant.abort();
    }

    pub fn is_leader(&self) -> bool {
        self.observer.is_leader()
    }

    pub fn lease_name(&self) -> &str {
        &self.lease_name
    }

    pub async fn next_transition(&mut self) -> Transition {
        self.observer.next_transition().await
    }

    /// A cloned, independently-tracked view of this lease's claim, used when
    /// one lease (the global election) is shared by every actor.
    pub fn observer(&self) -> ElectionObserver {
        ElectionObserver {
            holder_identity: self.observer.holder_identity.clone(),
            claims: self.observer.claims.clone(),
            was_leader: self.observer.was_leader,
        }
    }
}
