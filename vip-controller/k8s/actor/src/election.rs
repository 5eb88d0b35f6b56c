use vip_controller_k8s_election::{ElectionDriver, ElectionObserver, Transition};

/// The election topology resolved for one actor: either no election is
/// legal (multipath Route/BGP), a dedicated lease this actor owns outright
/// (per-service topology), or a shared view onto a lease one driver
/// elsewhere in the process owns (global topology — per-service still
/// takes precedence when both knobs are set, so `Owned` is what a
/// per-service actor gets even when global election is also enabled).
pub enum ElectionHandle {
    None,
    Owned(ElectionDriver),
    Shared(ElectionObserver),
}

impl ElectionHandle {
    pub fn is_leader(&self) -> bool {
        match self {
            Self::None => true,
            Self::Owned(driver) => driver.is_leader(),
            Self::Shared(observer) => observer.is_leader(),
        }
    }

    /// Awaits the next `Acquired`/`Lost` transition; never resolves for
    /// `None`, so a `tokio::select!` arm on this future simply never fires
    /// for actors running without an election.
    pub async fn next_transition(&mut self) -> Transition {
        match self {
            Self::None => std::future::pending().await,
            Self::Owned(driver) => driver.next_transition().await,
            Self::Shared(observer) => observer.next_transition().await,
        }
    }

    /// Relinquishes an owned lease on teardown; a no-op for
    /// `None`/`Shared`, since a shared observer's driver outlives any one
    /// actor.
    pub fn release(&self) {
        if let Self::Owned(driver) = self {
            driver.release();
        }
    }
}

/// Whether an actor should be advertising right now: leadership (or its
/// absence, when no election is configured) *and* — for
/// `ExternalTrafficPolicy=Local` — at least one locally-reachable endpoint.
/// Pulled out as a pure function so the ARMED/ACTIVE gating logic
/// is testable without constructing a real election or tracker.
pub fn eligible(election_ready: bool, endpoints_ready: bool) -> bool {
    election_ready && endpoints_ready
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_both_election_and_endpoints() {
        assert!(eligible(true, true));
        assert!(!eligible(false, true));
        assert!(!eligible(true, false));
        assert!(!eligible(false, false));
    }
}
