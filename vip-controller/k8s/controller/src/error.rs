/// Errors that escape the controller's event loop entirely — malformed
/// events and fatal startup kinds. A single service's host-programming or
/// election failure never reaches here — it is handled inside the actor.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("failed to acquire election for {namespace}/{name}: {source}")]
    Election {
        namespace: String,
        name: String,
        #[source]
        source: vip_controller_k8s_election::ElectionError,
    },
}
