#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    #[error("failed to fetch or create lease {0}: {1}")]
    Lease(String, #[source] kube::Error),

    #[error("failed to spawn lease claimant: {0}")]
    Spawn(#[source] anyhow::Error),
}
