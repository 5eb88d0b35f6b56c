use std::net::IpAddr;

/// A Kubernetes object UID, used as the stable key for the [Instance
/// Registry](crate) and for deriving per-service lease names.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Uid(String);

impl Uid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Uid {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

/// Mirrors a Service's `spec.externalTrafficPolicy`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum TrafficPolicy {
    #[default]
    Cluster,
    Local,
}

/// An immutable copy of the observed Service, as accepted (or rejected) by
/// the [`crate::filter`] stage.
///
/// Two snapshots compare equal only when their accept decision and address
/// list are equal — `name`/`namespace`/`traffic_policy` are
/// carried for logging and endpoint lookups but are not part of the
/// controller's notion of "did anything material change".
#[derive(Clone, Debug)]
pub struct ServiceSnapshot {
    pub uid: Uid,
    pub name: String,
    pub namespace: String,
    pub traffic_policy: TrafficPolicy,
    pub accepted: bool,
    pub addresses: Vec<IpAddr>,
}

impl PartialEq for ServiceSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.accepted == other.accepted && self.addresses == other.addresses
    }
}

impl Eq for ServiceSnapshot {}

/// Classifies a `Modified` event against the previously stored snapshot, per
/// the Service Actor's Modified-event policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SnapshotDiff {
    /// Accept decision and addresses are unchanged; no host-state churn.
    Unchanged,
    /// Addresses changed while the service remains accepted; the actor must
    /// be destroyed and recreated.
    AddressesChanged,
    /// The service was accepted and is now rejected (ignored, or filtered by
    /// class); treat like `Deleted`.
    AcceptedToRejected,
    /// The service was rejected and is now accepted; treat like `Added`.
    RejectedToAccepted,
}

impl ServiceSnapshot {
    /// Diffs `self` (new) against `previous`, deciding what the controller
    /// must do before issuing any `GarbageCollect`/`Assign`/`Withdraw` call —
    /// this implementation fixes "diff first, then GC".
    pub fn diff(&self, previous: &Self) -> SnapshotDiff {
        match (previous.accepted, self.accepted) {
            (true, false) => SnapshotDiff::AcceptedToRejected,
            (false, true) => SnapshotDiff::RejectedToAccepted,
            (false, false) => SnapshotDiff::Unchanged,
            (true, true) if self.addresses == previous.addresses => SnapshotDiff::Unchanged,
            (true, true) => SnapshotDiff::AddressesChanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(accepted: bool, addrs: &[&str]) -> ServiceSnapshot {
        ServiceSnapshot {
            uid: Uid::new("u1"),
            name: "svc".into(),
            namespace: "default".into(),
            traffic_policy: TrafficPolicy::Cluster,
            accepted,
            addresses: addrs.iter().map(|a| a.parse().unwrap()).collect(),
        }
    }

    #[test]
    fn unchanged_same_addresses() {
        let a = snap(true, &["10.0.0.7"]);
        let b = snap(true, &["10.0.0.7"]);
        assert_eq!(a.diff(&b), SnapshotDiff::Unchanged);
        assert_eq!(a, b);
    }

    #[test]
    fn addresses_changed() {
        let old = snap(true, &["10.0.0.8"]);
        let new = snap(true, &["10.0.0.9"]);
        assert_eq!(new.diff(&old), SnapshotDiff::AddressesChanged);
        assert_ne!(old, new);
    }

    #[test]
    fn accept_decision_flips() {
        let old = snap(true, &["10.0.0.1"]);
        let rejected = snap(false, &["10.0.0.1"]);
        assert_eq!(rejected.diff(&old), SnapshotDiff::AcceptedToRejected);
        assert_eq!(old.diff(&rejected), SnapshotDiff::RejectedToAccepted);
    }

    #[test]
    fn both_rejected_is_unchanged() {
        let old = snap(false, &["10.0.0.1"]);
        let new = snap(false, &["10.0.0.2"]);
        assert_eq!(new.diff(&old), SnapshotDiff::Unchanged);
    }
}
