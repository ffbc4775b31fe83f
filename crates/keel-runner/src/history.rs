//! Committed and staged events shared by the runners

use keel_core::{error::Result, EventId, Recorded};
use std::future::Future;
use tokio::sync::OnceCell;

/// Db events fetched at most once, plus events staged in memory
///
/// The first caller of [`EventHistory::load`] runs the fetch; concurrent
/// callers on the same instance wait for and share its result. A failed
/// fetch leaves the cache empty so the next call tries again.
pub struct EventHistory<E> {
    db: OnceCell<Vec<Recorded<E>>>,
    staged: Vec<E>,
}

impl<E> Default for EventHistory<E> {
    fn default() -> Self {
        Self {
            db: OnceCell::new(),
            staged: Vec::new(),
        }
    }
}

impl<E> EventHistory<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load<F, Fut>(&self, fetch: F) -> Result<EventView<'_, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Recorded<E>>>>,
    {
        let db = self.db.get_or_try_init(fetch).await?;
        Ok(EventView {
            db,
            staged: &self.staged,
        })
    }

    /// Db events if they were already fetched
    pub fn cached(&self) -> Option<&[Recorded<E>]> {
        self.db.get().map(Vec::as_slice)
    }

    pub fn stage(&mut self, event: E) {
        self.staged.push(event);
    }

    pub fn staged(&self) -> &[E] {
        &self.staged
    }

    /// Forget fetched db events; staged events are kept
    pub fn invalidate(&mut self) {
        self.db.take();
    }
}

/// Borrowed view of db events followed by staged events
pub struct EventView<'a, E> {
    db: &'a [Recorded<E>],
    staged: &'a [E],
}

impl<'a, E> Clone for EventView<'a, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, E> Copy for EventView<'a, E> {}

impl<'a, E> EventView<'a, E> {
    pub fn new(db: &'a [Recorded<E>], staged: &'a [E]) -> Self {
        Self { db, staged }
    }

    pub fn db_events(&self) -> &'a [Recorded<E>] {
        self.db
    }

    pub fn staged(&self) -> &'a [E] {
        self.staged
    }

    /// Db events then staged events, as payloads
    pub fn iter(&self) -> impl Iterator<Item = &'a E> + 'a {
        self.db.iter().map(|r| &r.event).chain(self.staged.iter())
    }

    pub fn len(&self) -> usize {
        self.db.len() + self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id of the newest db event
    pub fn last_db_id(&self) -> Option<EventId> {
        self.db.last().map(|r| r.id)
    }

    /// Fold db events and staged events
    pub fn reduce<T>(&self, reducer: impl FnMut(T, &E) -> T, initial: T) -> T {
        self.iter().fold(initial, reducer)
    }

    /// Fold committed events only, ignoring staged ones
    pub fn reduce_db<T>(&self, mut reducer: impl FnMut(T, &E) -> T, initial: T) -> T {
        self.db
            .iter()
            .fold(initial, |acc, recorded| reducer(acc, &recorded.event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorded(id: EventId, event: &'static str) -> Recorded<&'static str> {
        let now = Utc::now();
        Recorded {
            id,
            event,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_fetch_runs_once() {
        let history = EventHistory::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![recorded(1, "a")])
        };

        let (a, b) = tokio::join!(history.load(fetch), history.load(fetch));
        assert_eq!(a.unwrap().len(), 1);
        assert_eq!(b.unwrap().len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_retried() {
        let history: EventHistory<&'static str> = EventHistory::new();
        let err = history
            .load(|| async { Err(keel_core::KeelError::Internal("boom".into())) })
            .await;
        assert!(err.is_err());
        assert!(history.cached().is_none());

        let view = history.load(|| async { Ok(vec![recorded(3, "x")]) }).await.unwrap();
        assert_eq!(view.last_db_id(), Some(3));
    }

    #[tokio::test]
    async fn test_staged_follow_db_events() {
        let mut history = EventHistory::new();
        history.stage("staged");
        history.load(|| async { Ok(vec![recorded(1, "a"), recorded(2, "b")]) }).await.unwrap();

        let view = EventView::new(history.cached().unwrap(), history.staged());
        assert_eq!(view.iter().copied().collect::<Vec<_>>(), vec!["a", "b", "staged"]);
        assert_eq!(view.reduce(|n, _| n + 1, 0), 3);
        assert_eq!(view.reduce_db(|n, _| n + 1, 0), 2);

        history.invalidate();
        assert!(history.cached().is_none());
        assert_eq!(history.staged(), &["staged"]);
    }
}
