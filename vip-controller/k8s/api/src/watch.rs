use futures::prelude::*;
use kube::runtime::watcher;
use kube::ResourceExt;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::time::Duration;
use tracing::{info, warn, Instrument};

const BASE_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// The typed tag every consumer of a watch actually reacts to: the
/// raw stream's `Bookmark`/transient-`Error` outcomes never escape
/// [`Watch::recv`] — bookmarks are ignored and errors drive the retry loop
/// below.
#[derive(Clone, Debug)]
pub enum ServiceEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

/// Wraps a `kube` watch stream and never terminates: stream end or a
/// transient error is retried with jittered exponential backoff (200ms
/// base, doubling, capped at 30s, reset on the next successfully processed
/// event), replacing the ad hoc one-second sleep this pattern started from.
///
/// `Applied`/`Deleted`/`Restarted` events from the underlying watcher are
/// synthesized into `Added`/`Modified`/`Deleted` by tracking which UIDs have
/// already been observed, since the raw stream does not distinguish a
/// first-sight object from a re-applied one.
pub struct Watch<T: ResourceExt> {
    initialized: bool,
    span: tracing::Span,
    rx: Pin<Box<dyn Stream<Item = watcher::Result<watcher::Event<T>>> + Send + 'static>>,
    seen: HashMap<String, T>,
    pending: VecDeque<ServiceEvent<T>>,
    backoff: Duration,
}

impl<T, W> From<W> for Watch<T>
where
    T: ResourceExt,
    W: Stream<Item = watcher::Result<watcher::Event<T>>> + Send + 'static,
{
    fn from(watch: W) -> Self {
        Self::new(watch.boxed())
    }
}

impl<T: ResourceExt + Clone + Send + 'static> Watch<T> {
    pub fn new(rx: Pin<Box<dyn Stream<Item = watcher::Result<watcher::Event<T>>> + Send + 'static>>) -> Self {
        Self {
            rx,
            initialized: false,
            span: tracing::Span::current(),
            seen: HashMap::new(),
            pending: VecDeque::new(),
            backoff: BASE_BACKOFF,
        }
    }

    pub fn instrument(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Receives the next logical event, retrying indefinitely underneath.
    pub async fn recv(&mut self) -> ServiceEvent<T> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }

            let next = self.rx.next().instrument(self.span.clone()).await.expect("stream must not terminate");
            match next {
                Ok(event) => {
                    self.initialized = true;
                    self.backoff = BASE_BACKOFF;
                    self.absorb(event);
                }
                Err(error) => {
                    warn!(parent: &self.span, %error, backoff_ms = self.backoff.as_millis(), "watch failed, retrying");
                    tokio::time::sleep(jittered(self.backoff)).await;
                    self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    /// Expands one raw watcher event into zero or more typed events, queued
    /// for `recv` to drain one at a time.
    fn absorb(&mut self, event: watcher::Event<T>) {
        match event {
            watcher::Event::Applied(obj) => self.apply(obj),
            watcher::Event::Deleted(obj) => self.delete(obj),
            watcher::Event::Restarted(objs) => {
                info!(parent: &self.span, count = objs.len(), "watch restarted");
                let new_uids: std::collections::HashSet<String> =
                    objs.iter().map(|obj| obj.uid().unwrap_or_default()).collect();
                let gone: Vec<T> = self
                    .seen
                    .iter()
                    .filter(|(uid, _)| !new_uids.contains(*uid))
                    .map(|(_, obj)| obj.clone())
                    .collect();
                for obj in gone {
                    self.delete(obj);
                }
                for obj in objs {
                    self.apply(obj);
                }
            }
        }
    }

    fn apply(&mut self, obj: T) {
        let uid = obj.uid().unwrap_or_default();
        let event = if self.seen.insert(uid, obj.clone()).is_some() {
            ServiceEvent::Modified(obj)
        } else {
            ServiceEvent::Added(obj)
        };
        self.pending.push_back(event);
    }

    fn delete(&mut self, obj: T) {
        let uid = obj.uid().unwrap_or_default();
        self.seen.remove(&uid);
        self.pending.push_back(ServiceEvent::Deleted(obj));
    }
}

fn jittered(base: Duration) -> Duration {
    let jitter_ms = rand::random::<u64>() % (base.as_millis() as u64 + 1);
    base + Duration::from_millis(jitter_ms)
}

/// The consumer-facing surface of a [`Watch`]: a restartable, typed event
/// source the Service Controller drives. Implemented by `Watch` itself
/// and, under `test-util`, by
/// [`crate::fake::FakeEventSource`] so the controller can be exercised
/// without a cluster.
#[async_trait::async_trait]
pub trait EventSource<T>: Send {
    async fn recv(&mut self) -> ServiceEvent<T>;
}

#[async_trait::async_trait]
impl<T: ResourceExt + Clone + Send + 'static> EventSource<T> for Watch<T> {
    async fn recv(&mut self) -> ServiceEvent<T> {
        Watch::recv(self).await
    }
}
