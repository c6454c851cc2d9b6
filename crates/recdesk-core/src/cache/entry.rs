// ── Cache entry ──
//
// One `QueryEntry` per (endpoint, argument). It owns the watch channel its
// subscribers read from, the subscriber set, the single in-flight fetch,
// the tags its latest result provided, the polling task and the eviction
// timer.
//
// Lock order: the entry mutex may be held while sending on the watch
// channel and while spawning tasks, never while touching the cache map.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::state::{QueryState, QueryStatus, SubscribeOptions};
use super::{CacheInner, CacheKey};
use crate::endpoint::{QueryDef, run_endpoint};
use crate::error::CoreError;
use crate::tags::{Tag, overlaps};

/// A fetch shared by everyone waiting on the same key.
pub(crate) type Flight = Shared<BoxFuture<'static, ()>>;

/// Type-erased view of an entry, stored in the cache map.
pub(crate) trait CacheSlot: Send + Sync {
    fn key(&self) -> &CacheKey;
    /// Invalidate if the latest result provided one of `tags`. A fetch in
    /// flight remembers `tags` and checks them against its own result.
    /// Returns whether the entry was invalidated now.
    fn invalidate_matching(self: Arc<Self>, tags: &[Tag]) -> bool;
    /// Tags the latest successful fetch provided.
    fn provided_tags(&self) -> Vec<Tag>;
    fn on_focus(self: Arc<Self>);
    fn on_reconnect(self: Arc<Self>);
    fn subscriber_count(&self) -> usize;
    fn is_evicted(&self) -> bool;
    /// Evict unconditionally (cache reset).
    fn shutdown(&self);
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) struct QueryEntry<D: QueryDef> {
    key: CacheKey,
    def: Arc<D>,
    arg: D::Arg,
    cache: Weak<CacheInner>,
    state: watch::Sender<QueryState<D::Output>>,
    evicted: AtomicBool,
    inner: Mutex<EntryInner>,
}

struct EntryInner {
    subscribers: HashMap<u64, SubscribeOptions>,
    /// Needs a fetch before it can be served as fresh.
    stale: bool,
    in_flight: Option<Flight>,
    /// Invalidated while a fetch was in flight: run one more afterwards.
    refetch_queued: bool,
    /// Tags invalidated while a fetch was in flight, checked against its
    /// result.
    pending_tags: Vec<Tag>,
    provided: Vec<Tag>,
    started_seq: u64,
    applied_seq: u64,
    fetched_at: Option<Instant>,
    poll: Option<(Duration, CancellationToken)>,
    /// Bumped on every attach/detach; a pending eviction only fires if the
    /// epoch it captured is still current.
    evict_epoch: u64,
}

impl<D: QueryDef> QueryEntry<D> {
    pub(crate) fn new(key: CacheKey, def: Arc<D>, arg: D::Arg, cache: Weak<CacheInner>) -> Self {
        let (state, _) = watch::channel(QueryState::uninitialized());
        Self {
            key,
            def,
            arg,
            cache,
            state,
            evicted: AtomicBool::new(false),
            inner: Mutex::new(EntryInner {
                subscribers: HashMap::new(),
                stale: true,
                in_flight: None,
                refetch_queued: false,
                pending_tags: Vec::new(),
                provided: Vec::new(),
                started_seq: 0,
                applied_seq: 0,
                fetched_at: None,
                poll: None,
                evict_epoch: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EntryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn arg(&self) -> &D::Arg {
        &self.arg
    }

    pub(crate) fn watch(&self) -> watch::Receiver<QueryState<D::Output>> {
        self.state.subscribe()
    }

    pub(crate) fn snapshot(&self) -> QueryState<D::Output> {
        self.state.borrow().clone()
    }

    pub(crate) fn evicted_error(&self) -> CoreError {
        CoreError::Evicted {
            key: self.key.to_string(),
        }
    }

    // ── Subscribers ─────────────────────────────────────────────────

    /// Attach a subscriber. Returns the flight to await when the entry
    /// needed a fetch (started here or already running).
    pub(crate) fn attach(
        self: &Arc<Self>,
        id: u64,
        options: SubscribeOptions,
        force: bool,
    ) -> Result<Option<Flight>, CoreError> {
        let mut inner = self.lock();
        if self.is_evicted() {
            return Err(self.evicted_error());
        }

        inner.subscribers.insert(id, options);
        inner.evict_epoch += 1;
        self.reconcile_polling(&mut inner);

        let needs_fetch = force || inner.stale || self.is_expired(&inner);
        trace!(key = %self.key, subscribers = inner.subscribers.len(), needs_fetch, "subscriber attached");
        Ok(if needs_fetch {
            self.start_or_join(&mut inner)
        } else {
            None
        })
    }

    /// Detach a subscriber. At zero subscribers polling stops and eviction
    /// is scheduled after the grace period.
    pub(crate) fn detach(self: &Arc<Self>, id: u64) {
        let mut inner = self.lock();
        if inner.subscribers.remove(&id).is_none() {
            return;
        }
        self.reconcile_polling(&mut inner);
        if !inner.subscribers.is_empty() || self.is_evicted() {
            return;
        }

        inner.evict_epoch += 1;
        let epoch = inner.evict_epoch;
        drop(inner);
        trace!(key = %self.key, "last subscriber detached");
        self.schedule_eviction(epoch);
    }

    fn schedule_eviction(self: &Arc<Self>, epoch: u64) {
        let Some(cache) = self.cache.upgrade() else {
            return;
        };
        let keep = cache.config.keep_unused_for;
        drop(cache);

        match Handle::try_current() {
            Ok(handle) if !keep.is_zero() => {
                let entry = Arc::downgrade(self);
                handle.spawn(async move {
                    tokio::time::sleep(keep).await;
                    if let Some(entry) = entry.upgrade() {
                        entry.try_evict(epoch);
                    }
                });
            }
            _ => self.try_evict(epoch),
        }
    }

    fn try_evict(&self, epoch: u64) {
        {
            let inner = self.lock();
            if !inner.subscribers.is_empty() || inner.evict_epoch != epoch {
                return;
            }
            if self.evicted.swap(true, Ordering::SeqCst) {
                return;
            }
        }

        debug!(key = %self.key, "evicting unused cache entry");
        if let Some(cache) = self.cache.upgrade() {
            cache.remove_entry(&self.key);
        }
    }

    // ── Fetching ────────────────────────────────────────────────────

    /// Start a fetch, or join the one in flight.
    pub(crate) fn refetch(self: &Arc<Self>) -> Result<Option<Flight>, CoreError> {
        let mut inner = self.lock();
        if self.is_evicted() {
            return Err(self.evicted_error());
        }
        Ok(self.start_or_join(&mut inner))
    }

    fn start_or_join(self: &Arc<Self>, inner: &mut EntryInner) -> Option<Flight> {
        if let Some(flight) = &inner.in_flight {
            trace!(key = %self.key, "joining in-flight fetch");
            return Some(flight.clone());
        }

        let Ok(handle) = Handle::try_current() else {
            warn!(key = %self.key, "no tokio runtime available, fetch skipped");
            return None;
        };

        inner.started_seq += 1;
        let seq = inner.started_seq;
        let flight = Arc::clone(self).run_fetch(seq).boxed().shared();
        inner.in_flight = Some(flight.clone());

        self.state.send_modify(|state| {
            state.is_fetching = true;
            if state.data.is_none() {
                state.status = QueryStatus::Loading;
            }
        });

        handle.spawn(flight.clone());
        Some(flight)
    }

    async fn run_fetch(self: Arc<Self>, seq: u64) {
        let Some(client) = self.cache.upgrade().map(|cache| cache.client.clone()) else {
            return;
        };

        trace!(key = %self.key, seq, "fetch started");
        let result = run_endpoint(&client, self.def.as_ref(), &self.arg).await;
        self.complete(seq, result);
    }

    fn complete(self: &Arc<Self>, seq: u64, result: Result<D::Output, CoreError>) {
        let mut inner = self.lock();
        inner.in_flight = None;
        let pending = std::mem::take(&mut inner.pending_tags);

        if self.is_evicted() {
            trace!(key = %self.key, seq, "entry evicted, dropping fetch result");
            return;
        }
        if seq <= inner.applied_seq {
            trace!(key = %self.key, seq, "superseded fetch result ignored");
            return;
        }
        inner.applied_seq = seq;

        if inner.subscribers.is_empty() {
            debug!(key = %self.key, "no subscribers left, discarding fetch result");
            inner.stale = true;
            inner.refetch_queued = false;
            self.state.send_modify(|state| {
                state.is_fetching = false;
                state.is_stale = true;
                if state.status == QueryStatus::Loading {
                    state.status = QueryStatus::Uninitialized;
                }
            });
            return;
        }

        match result {
            Ok(output) => {
                let tags = self.def.provides_tags(&output, &self.arg);
                // The response may predate a mutation that landed mid-flight.
                let outdated = overlaps(&pending, &tags);
                if outdated {
                    debug!(key = %self.key, "result invalidated while in flight, refetch queued");
                    inner.refetch_queued = true;
                }
                inner.provided = tags;
                inner.stale = outdated;
                let fetched_at = Instant::now();
                inner.fetched_at = Some(fetched_at);
                self.state.send_modify(|state| {
                    state.status = QueryStatus::Success;
                    state.data = Some(Arc::new(output));
                    state.error = None;
                    state.is_fetching = false;
                    state.is_stale = outdated;
                    state.last_fetched_at = Some(Utc::now());
                });
                self.schedule_expiry(fetched_at);
            }
            Err(err) => {
                debug!(key = %self.key, error = %err, "fetch failed");
                inner.stale = true;
                self.state.send_modify(|state| {
                    state.status = QueryStatus::Error;
                    state.error = Some(err);
                    state.is_fetching = false;
                });
            }
        }

        if std::mem::take(&mut inner.refetch_queued) {
            trace!(key = %self.key, "running queued refetch");
            self.start_or_join(&mut inner);
        }
    }

    fn stale_time(&self) -> Option<Duration> {
        self.cache.upgrade().and_then(|cache| cache.config.stale_time)
    }

    fn is_expired(&self, inner: &EntryInner) -> bool {
        let Some(stale_time) = self.stale_time() else {
            return false;
        };
        inner
            .fetched_at
            .is_some_and(|at| at.elapsed() >= stale_time)
    }

    /// Flag the result fetched at `fetched_at` stale once `stale_time`
    /// elapses, unless a newer fetch replaced it first.
    fn schedule_expiry(self: &Arc<Self>, fetched_at: Instant) {
        let Some(stale_time) = self.stale_time() else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        let entry = Arc::downgrade(self);
        handle.spawn(async move {
            tokio::time::sleep_until(fetched_at + stale_time).await;
            if let Some(entry) = entry.upgrade() {
                entry.expire(fetched_at);
            }
        });
    }

    fn expire(&self, fetched_at: Instant) {
        let mut inner = self.lock();
        if self.is_evicted() || inner.fetched_at != Some(fetched_at) {
            return;
        }
        trace!(key = %self.key, "result expired");
        inner.stale = true;
        self.state.send_modify(|state| state.is_stale = true);
    }

    /// Mark stale; refetch now if subscribed, else on next subscription.
    fn invalidate(self: &Arc<Self>, inner: &mut EntryInner) {
        inner.stale = true;
        self.state.send_modify(|state| state.is_stale = true);

        if inner.subscribers.is_empty() {
            trace!(key = %self.key, "invalidated without subscribers, refetch deferred");
        } else if inner.in_flight.is_some() {
            trace!(key = %self.key, "invalidated mid-fetch, refetch queued");
            inner.refetch_queued = true;
        } else {
            debug!(key = %self.key, "invalidated, refetching");
            self.start_or_join(inner);
        }
    }

    fn refetch_if(self: &Arc<Self>, wants: impl Fn(&SubscribeOptions) -> bool, reason: &str) {
        let mut inner = self.lock();
        if self.is_evicted() || !inner.subscribers.values().any(wants) {
            return;
        }
        debug!(key = %self.key, reason, "refetching");
        self.start_or_join(&mut inner);
    }

    // ── Polling ─────────────────────────────────────────────────────

    /// Run one polling task at the smallest non-zero interval requested by
    /// the current subscribers, or none.
    fn reconcile_polling(self: &Arc<Self>, inner: &mut EntryInner) {
        let wanted = inner
            .subscribers
            .values()
            .map(|opts| opts.polling_interval)
            .filter(|interval| !interval.is_zero())
            .min();

        if inner.poll.as_ref().map(|(period, _)| *period) == wanted {
            return;
        }
        if let Some((_, cancel)) = inner.poll.take() {
            cancel.cancel();
        }

        let Some(period) = wanted else {
            trace!(key = %self.key, "polling stopped");
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            warn!(key = %self.key, "no tokio runtime available, polling disabled");
            return;
        };

        debug!(key = %self.key, ?period, "polling started");
        let cancel = CancellationToken::new();
        handle.spawn(poll_loop(Arc::downgrade(self), period, cancel.clone()));
        inner.poll = Some((period, cancel));
    }
}

async fn poll_loop<D: QueryDef>(
    entry: Weak<QueryEntry<D>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(entry) = entry.upgrade() else { break };
                let Ok(flight) = entry.refetch() else { break };
                drop(entry);
                if let Some(flight) = flight {
                    flight.await;
                }
            }
        }
    }
}

impl<D: QueryDef> CacheSlot for QueryEntry<D> {
    fn key(&self) -> &CacheKey {
        &self.key
    }

    fn invalidate_matching(self: Arc<Self>, tags: &[Tag]) -> bool {
        let mut inner = self.lock();
        if self.is_evicted() {
            return false;
        }

        if overlaps(&inner.provided, tags) {
            self.invalidate(&mut inner);
            return true;
        }
        if inner.in_flight.is_some() {
            inner.pending_tags.extend_from_slice(tags);
        }
        false
    }

    fn provided_tags(&self) -> Vec<Tag> {
        self.lock().provided.clone()
    }

    fn on_focus(self: Arc<Self>) {
        self.refetch_if(|opts| opts.refetch_on_focus, "focus regained");
    }

    fn on_reconnect(self: Arc<Self>) {
        self.refetch_if(|opts| opts.refetch_on_reconnect, "reconnected");
    }

    fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        let mut inner = self.lock();
        self.evicted.store(true, Ordering::SeqCst);
        if let Some((_, cancel)) = inner.poll.take() {
            cancel.cancel();
        }
        inner.in_flight = None;
        inner.refetch_queued = false;
        inner.pending_tags.clear();
        inner.provided.clear();

        let err = self.evicted_error();
        self.state.send_modify(|state| {
            state.status = QueryStatus::Error;
            state.data = None;
            state.error = Some(err);
            state.is_fetching = false;
            state.is_stale = true;
        });
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
