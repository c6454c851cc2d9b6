// ── Query endpoints and subscriptions ──
//
// `QueryEndpoint` is the bound handle returned by registration;
// `QuerySubscription` is the RAII consumer handle. Dropping a subscription
// detaches it from its entry.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::entry::{CacheSlot, QueryEntry};
use super::state::{QueryState, QueryStatus, SubscribeOptions};
use super::{CacheKey, QueryCache};
use crate::endpoint::QueryDef;
use crate::error::CoreError;

// ── QueryEndpoint ────────────────────────────────────────────────────

/// A registered query, bound to its cache.
pub struct QueryEndpoint<D: QueryDef> {
    def: Arc<D>,
    cache: QueryCache,
}

impl<D: QueryDef> Clone for QueryEndpoint<D> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
            cache: self.cache.clone(),
        }
    }
}

impl<D: QueryDef> QueryEndpoint<D> {
    pub(crate) fn new(def: Arc<D>, cache: QueryCache) -> Self {
        Self { def, cache }
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn definition(&self) -> &D {
        &self.def
    }

    pub fn key_for(&self, arg: &D::Arg) -> Result<CacheKey, CoreError> {
        CacheKey::for_arg(self.def.name(), arg)
    }

    /// Subscribe to `(self, arg)`.
    ///
    /// Serves the cached value when fresh; otherwise starts a fetch or joins
    /// the one already in flight for the same key. Must be called from
    /// within a tokio runtime.
    pub fn subscribe(
        &self,
        arg: D::Arg,
        options: SubscribeOptions,
    ) -> Result<QuerySubscription<D>, CoreError> {
        if Handle::try_current().is_err() {
            return Err(CoreError::Internal(
                "query subscriptions need a running tokio runtime".into(),
            ));
        }

        let id = self.cache.next_subscriber_id();
        let force = options.refetch_on_mount_or_arg_change;
        let entry = self.attach(&arg, id, &options, force)?;
        let rx = entry.watch();

        Ok(QuerySubscription {
            endpoint: self.clone(),
            entry,
            id,
            options,
            rx,
        })
    }

    /// One request-response cycle through the cache: subscribe, wait for
    /// the settled value, unsubscribe.
    pub async fn fetch(&self, arg: D::Arg) -> Result<Arc<D::Output>, CoreError> {
        let mut subscription = self.subscribe(arg, SubscribeOptions::default())?;
        subscription.settled().await
    }

    /// Current state for `arg` without subscribing. `None` if no entry.
    pub fn select(&self, arg: &D::Arg) -> Option<QueryState<D::Output>> {
        let key = self.key_for(arg).ok()?;
        self.cache
            .existing_entry::<D>(&key)
            .map(|entry| entry.snapshot())
    }

    fn attach(
        &self,
        arg: &D::Arg,
        id: u64,
        options: &SubscribeOptions,
        force: bool,
    ) -> Result<Arc<QueryEntry<D>>, CoreError> {
        let key = self.key_for(arg)?;
        loop {
            let entry = self.cache.entry_for(&self.def, &key, arg)?;
            match entry.attach(id, options.clone(), force) {
                Ok(_) => return Ok(entry),
                // Lost a race with eviction; drop the dead entry and retry.
                Err(CoreError::Evicted { .. }) => self.cache.purge_evicted(&key),
                Err(err) => return Err(err),
            }
        }
    }
}

impl<D: QueryDef> fmt::Debug for QueryEndpoint<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEndpoint")
            .field("name", &self.def.name())
            .finish_non_exhaustive()
    }
}

// ── QuerySubscription ────────────────────────────────────────────────

/// A live subscription. Dropping it (or calling [`unsubscribe`]) detaches
/// it; the entry is evicted once unused for the configured grace period.
///
/// [`unsubscribe`]: QuerySubscription::unsubscribe
pub struct QuerySubscription<D: QueryDef> {
    endpoint: QueryEndpoint<D>,
    entry: Arc<QueryEntry<D>>,
    id: u64,
    options: SubscribeOptions,
    rx: watch::Receiver<QueryState<D::Output>>,
}

impl<D: QueryDef> QuerySubscription<D> {
    pub fn key(&self) -> &CacheKey {
        self.entry.key()
    }

    pub fn arg(&self) -> &D::Arg {
        self.entry.arg()
    }

    pub fn options(&self) -> &SubscribeOptions {
        &self.options
    }

    /// Latest state.
    pub fn state(&self) -> QueryState<D::Output> {
        self.rx.borrow().clone()
    }

    /// Latest successful value, if any.
    pub fn data(&self) -> Option<Arc<D::Output>> {
        self.rx.borrow().data.clone()
    }

    /// Wait for the next state change.
    pub async fn changed(&mut self) -> Result<QueryState<D::Output>, CoreError> {
        if self.rx.changed().await.is_err() {
            return Err(self.entry.evicted_error());
        }
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Wait until the state satisfies `predicate` (checked immediately too).
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&QueryState<D::Output>) -> bool,
    ) -> Result<QueryState<D::Output>, CoreError> {
        match self.rx.wait_for(predicate).await {
            Ok(state) => Ok((*state).clone()),
            Err(_) => Err(self.entry.evicted_error()),
        }
    }

    /// Wait until no fetch is in flight, then return the value or the error
    /// of the latest fetch.
    pub async fn settled(&mut self) -> Result<Arc<D::Output>, CoreError> {
        let state = self.wait_for(QueryState::is_settled).await?;
        into_result(state, &self.entry)
    }

    /// Force a fetch (joining one in flight) and wait for its outcome.
    pub async fn refetch(&mut self) -> Result<Arc<D::Output>, CoreError> {
        if let Some(flight) = self.entry.refetch()? {
            flight.await;
        }
        let state = self.rx.borrow_and_update().clone();
        into_result(state, &self.entry)
    }

    /// Move this subscription to another argument. The old key keeps its
    /// data and becomes eligible for eviction if this was its last user.
    pub fn change_arg(&mut self, arg: D::Arg) -> Result<(), CoreError> {
        let key = self.endpoint.key_for(&arg)?;
        if &key == self.key() {
            return Ok(());
        }

        let entry = self.endpoint.attach(
            &arg,
            self.id,
            &self.options,
            self.options.refetch_on_mount_or_arg_change,
        )?;
        let previous = std::mem::replace(&mut self.entry, entry);
        previous.detach(self.id);

        self.rx = self.entry.watch();
        self.rx.mark_changed();
        Ok(())
    }

    /// Detach now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}

    /// Turn into a `Stream` of states, starting with the current one.
    /// The subscription stays alive as long as the stream.
    pub fn into_stream(self) -> QueryStream<D> {
        let inner = WatchStream::new(self.rx.clone());
        QueryStream {
            _subscription: self,
            inner,
        }
    }
}

impl<D: QueryDef> Drop for QuerySubscription<D> {
    fn drop(&mut self) {
        self.entry.detach(self.id);
    }
}

impl<D: QueryDef> fmt::Debug for QuerySubscription<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySubscription")
            .field("key", self.key())
            .field("id", &self.id)
            .field("status", &self.rx.borrow().status)
            .finish_non_exhaustive()
    }
}

fn into_result<D: QueryDef>(
    state: QueryState<D::Output>,
    entry: &QueryEntry<D>,
) -> Result<Arc<D::Output>, CoreError> {
    match state.status {
        QueryStatus::Success => state
            .data
            .ok_or_else(|| CoreError::Internal("successful query without data".into())),
        QueryStatus::Error => Err(state.error.unwrap_or_else(|| entry.evicted_error())),
        QueryStatus::Uninitialized | QueryStatus::Loading => Err(CoreError::Internal(
            "query has not completed a fetch".into(),
        )),
    }
}

// ── QueryStream ──────────────────────────────────────────────────────

/// `Stream` adapter over a subscription's watch channel.
pub struct QueryStream<D: QueryDef> {
    _subscription: QuerySubscription<D>,
    inner: WatchStream<QueryState<D::Output>>,
}

impl<D: QueryDef> Stream for QueryStream<D> {
    type Item = QueryState<D::Output>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
