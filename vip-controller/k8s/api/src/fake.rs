//! A scripted [`EventSource`] used by the Service Controller's tests in
//! place of a real API-server watch.
use crate::watch::{EventSource, ServiceEvent};
use std::collections::VecDeque;

/// Replays a fixed sequence of events, then pends forever — mirroring a
/// [`crate::Watch`] that has drained its backlog and is blocked on the next
/// server push, so a test can drive the controller through a known
/// sequence without the loop ever observing a spurious terminal state.
pub struct FakeEventSource<T> {
    events: VecDeque<ServiceEvent<T>>,
}

impl<T> FakeEventSource<T> {
    pub fn new(events: impl IntoIterator<Item = ServiceEvent<T>>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }
}

#[async_trait::async_trait]
impl<T: Send> EventSource<T> for FakeEventSource<T> {
    async fn recv(&mut self) -> ServiceEvent<T> {
        match self.events.pop_front() {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }
}
