use sha2::{Digest, Sha256};

/// Truncated hex digest length for per-service lease names: long enough
/// that collisions are not a practical concern, short enough that
/// `format!("{prefix}-{digest}")` stays a valid Kubernetes object name
/// (max 253 characters, but conventionally kept well under 63) regardless
/// of how long the source Service's own name is.
const DIGEST_LEN: usize = 16;

/// Derives the per-service election lease name: deterministic from
/// `namespace`/`name` alone, so a restarted actor or a peer node computes
/// the identical name without a side channel.
pub fn per_service_lease_name(prefix: &str, namespace: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b"/");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    format!("{prefix}-{}", &hex[..DIGEST_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let a = per_service_lease_name("vip", "default", "web");
        let b = per_service_lease_name("vip", "default", "web");
        assert_eq!(a, b);
    }

    #[test]
    fn distinguishes_namespace_and_name() {
        let a = per_service_lease_name("vip", "default", "web");
        let b = per_service_lease_name("vip", "other", "web");
        let c = per_service_lease_name("vip", "default", "api");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn stays_within_kubernetes_name_limits() {
        let long_name = "x".repeat(250);
        let name = per_service_lease_name("vip", "default", &long_name);
        assert!(name.len() < 63);
    }
}
