use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use super::state::LoadState;
use crate::error::Result;
use crate::events::ChallengeEvent;
use crate::model::ChallengeId;

type FetchFuture<V> = Pin<Box<dyn Future<Output = Result<V>> + Send>>;
type Fetch<V> = Box<dyn Fn() -> FetchFuture<V> + Send + Sync>;

/// A read that re-delivers its latest value.
///
/// The first [`next`](Self::next) fetches immediately. Each later call waits
/// for an event that concerns the watched challenge (any event when the
/// subscription is not scoped to one), then fetches again. Dropping the
/// subscription has no side effects.
pub struct Subscription<V> {
    fetch: Fetch<V>,
    events: broadcast::Receiver<ChallengeEvent>,
    scope: Option<ChallengeId>,
    latest: LoadState<V>,
    primed: bool,
}

impl<V: Clone> Subscription<V> {
    pub(crate) fn new<F, Fut>(
        events: broadcast::Receiver<ChallengeEvent>,
        scope: Option<ChallengeId>,
        fetch: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Self {
            fetch: Box::new(move || Box::pin(fetch())),
            events,
            scope,
            latest: LoadState::Loading,
            primed: false,
        }
    }

    /// The most recently delivered state; `Loading` before the first fetch.
    pub fn latest(&self) -> &LoadState<V> {
        &self.latest
    }

    /// Wait for the next value. Returns `None` once the event bus is gone.
    pub async fn next(&mut self) -> Option<LoadState<V>> {
        if self.primed {
            self.wait_for_change().await?;
        }
        self.primed = true;
        self.latest = LoadState::from_result((self.fetch)().await);
        Some(self.latest.clone())
    }

    async fn wait_for_change(&mut self) -> Option<()> {
        loop {
            match self.events.recv().await {
                Ok(event) if self.concerns(&event) => return Some(()),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    // Something relevant may be among the missed events.
                    debug!(missed, scope = ?self.scope, "subscription lagged");
                    return Some(());
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn concerns(&self, event: &ChallengeEvent) -> bool {
        match self.scope {
            Some(id) => event.affects(id),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::events::EventBus;
    use crate::repository::LoadFailure;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting(bus: &EventBus, scope: Option<ChallengeId>) -> (Subscription<u32>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(bus.subscribe(), scope, move || {
            let counter = counter.clone();
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
        });
        (sub, calls)
    }

    #[tokio::test]
    async fn first_value_is_immediate() {
        let bus = EventBus::new();
        let (mut sub, _) = counting(&bus, Some(1));
        assert!(sub.latest().is_loading());
        assert_eq!(sub.next().await, Some(LoadState::Success(1)));
        assert_eq!(sub.latest(), &LoadState::Success(1));
    }

    #[tokio::test]
    async fn unrelated_events_are_skipped() {
        let bus = EventBus::new();
        let (mut sub, calls) = counting(&bus, Some(1));
        sub.next().await;

        bus.publish(ChallengeEvent::ChallengeDeleted { challenge_id: 2 });
        bus.notify_time_changed();
        assert_eq!(sub.next().await, Some(LoadState::Success(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_and_close() {
        let bus = EventBus::new();
        let (mut sub, _) = counting(&bus, None);
        sub.next().await;
        bus.request_refresh(Some(42));
        assert_eq!(sub.next().await, Some(LoadState::Success(2)));
        drop(bus);
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn lag_forces_refetch() {
        let bus = EventBus::with_capacity(2);
        let (mut sub, _) = counting(&bus, Some(1));
        sub.next().await;
        for id in 10..20 {
            bus.publish(ChallengeEvent::ChallengeDeleted { challenge_id: id });
        }
        assert_eq!(sub.next().await, Some(LoadState::Success(2)));
    }

    #[tokio::test]
    async fn errors_become_failures() {
        let bus = EventBus::new();
        let mut sub: Subscription<u32> = Subscription::new(bus.subscribe(), Some(1), || async {
            Err(CoreError::Network("offline".into()))
        });
        assert_eq!(
            sub.next().await,
            Some(LoadState::Failed(LoadFailure::Network))
        );
    }
}
