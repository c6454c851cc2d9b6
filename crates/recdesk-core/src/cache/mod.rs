// ── Query cache ──
//
// Per-key cache entries with request coalescing, subscriber tracking,
// polling, focus/reconnect refetch and tag-driven invalidation. Entries
// are created on first subscription and evicted once unused for
// `keep_unused_for`.

mod entry;
mod state;
mod subscription;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, trace};

use recdesk_api::ApiClient;

use crate::endpoint::{EndpointKind, EndpointRegistry, MutationDef, QueryDef};
use crate::error::CoreError;
use crate::mutation::MutationEndpoint;
use crate::tags::Tag;

use self::entry::{CacheSlot, QueryEntry};
pub use self::state::{QueryState, QueryStatus, SubscribeOptions};
pub use self::subscription::{QueryEndpoint, QueryStream, QuerySubscription};

/// Grace period before an unused entry is dropped.
pub const DEFAULT_KEEP_UNUSED_FOR: Duration = Duration::from_secs(60);

// ── Configuration ────────────────────────────────────────────────────

/// Cache freshness tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// A successful entry goes stale after this long. `None` keeps it fresh
    /// until invalidated.
    pub stale_time: Option<Duration>,
    /// How long an entry with no subscribers is kept.
    pub keep_unused_for: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: None,
            keep_unused_for: DEFAULT_KEEP_UNUSED_FOR,
        }
    }
}

// ── Cache key ────────────────────────────────────────────────────────

/// `(endpoint name, serialized argument)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    endpoint: String,
    arg: String,
}

impl CacheKey {
    pub fn new(endpoint: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            arg: arg.into(),
        }
    }

    /// Build a key by serializing the argument to compact JSON.
    pub fn for_arg<A: Serialize>(endpoint: &str, arg: &A) -> Result<Self, CoreError> {
        Ok(Self::new(endpoint, serde_json::to_string(arg)?))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn arg(&self) -> &str {
        &self.arg
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.endpoint, self.arg)
    }
}

// ── QueryCache ───────────────────────────────────────────────────────

/// The query cache. Cheaply cloneable; clones share all state.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

pub(crate) struct CacheInner {
    client: ApiClient,
    config: QueryConfig,
    entries: DashMap<CacheKey, Arc<dyn CacheSlot>>,
    registry: EndpointRegistry,
    next_subscriber: AtomicU64,
}

impl QueryCache {
    pub fn new(client: ApiClient, config: QueryConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                client,
                config,
                entries: DashMap::new(),
                registry: EndpointRegistry::default(),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    // ── Registration ────────────────────────────────────────────────

    /// Register a query. Names are unique across queries and mutations.
    pub fn register_query<D: QueryDef>(&self, def: D) -> Result<QueryEndpoint<D>, CoreError> {
        self.inner.registry.claim(def.name(), EndpointKind::Query)?;
        trace!(endpoint = def.name(), "query registered");
        Ok(QueryEndpoint::new(Arc::new(def), self.clone()))
    }

    /// Register a mutation. Names are unique across queries and mutations.
    pub fn register_mutation<D: MutationDef>(
        &self,
        def: D,
    ) -> Result<MutationEndpoint<D>, CoreError> {
        self.inner
            .registry
            .claim(def.name(), EndpointKind::Mutation)?;
        trace!(endpoint = def.name(), "mutation registered");
        Ok(MutationEndpoint::new(Arc::new(def), self.clone()))
    }

    /// Kind of a registered endpoint, by name.
    pub fn endpoint_kind(&self, name: &str) -> Option<EndpointKind> {
        self.inner.registry.kind_of(name)
    }

    pub fn endpoint_count(&self) -> usize {
        self.inner.registry.len()
    }

    // ── Invalidation & triggers ─────────────────────────────────────

    /// Mark every entry whose latest result provided one of `tags` stale.
    /// Subscribed entries refetch right away. An entry with a fetch in
    /// flight refetches once more if that fetch turns out to provide one of
    /// `tags`. Returns the keys invalidated now.
    pub fn invalidate_tags(&self, tags: &[Tag]) -> Vec<CacheKey> {
        if tags.is_empty() {
            return Vec::new();
        }

        let keys: Vec<CacheKey> = self
            .slots()
            .into_iter()
            .filter_map(|slot| {
                let key = slot.key().clone();
                slot.invalidate_matching(tags).then_some(key)
            })
            .collect();

        debug!(
            tags = %tags.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            entries = keys.len(),
            "invalidated tags"
        );
        keys
    }

    /// The consuming surface regained focus.
    pub fn on_focus(&self) {
        for slot in self.slots() {
            slot.on_focus();
        }
    }

    /// Network connectivity came back.
    pub fn on_reconnect(&self) {
        for slot in self.slots() {
            slot.on_reconnect();
        }
    }

    /// Drop every entry. Live subscriptions see `CoreError::Evicted`.
    pub fn reset(&self) {
        let slots = self.slots();
        self.inner.entries.clear();
        for slot in &slots {
            slot.shutdown();
        }
        info!(entries = slots.len(), "query cache reset");
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn entry_count(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Number of live subscribers on a key (0 if absent).
    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.inner
            .entries
            .get(key)
            .map(|slot| Arc::clone(slot.value()))
            .map_or(0, |slot| slot.subscriber_count())
    }

    /// Tags a key provided on its latest successful fetch.
    pub fn provided_tags(&self, key: &CacheKey) -> Vec<Tag> {
        self.inner
            .entries
            .get(key)
            .map(|slot| Arc::clone(slot.value()))
            .map_or_else(Vec::new, |slot| slot.provided_tags())
    }

    // ── Crate-internal plumbing ─────────────────────────────────────

    pub(crate) fn next_subscriber_id(&self) -> u64 {
        self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up the entry for `key`, creating it if absent.
    pub(crate) fn entry_for<D: QueryDef>(
        &self,
        def: &Arc<D>,
        key: &CacheKey,
        arg: &D::Arg,
    ) -> Result<Arc<QueryEntry<D>>, CoreError> {
        let slot = Arc::clone(
            self.inner
                .entries
                .entry(key.clone())
                .or_insert_with(|| {
                    trace!(%key, "creating cache entry");
                    let entry: Arc<dyn CacheSlot> = Arc::new(QueryEntry::new(
                        key.clone(),
                        Arc::clone(def),
                        arg.clone(),
                        Arc::downgrade(&self.inner),
                    ));
                    entry
                })
                .value(),
        );
        downcast(slot, key)
    }

    /// Look up the entry for `key` without creating it.
    pub(crate) fn existing_entry<D: QueryDef>(
        &self,
        key: &CacheKey,
    ) -> Option<Arc<QueryEntry<D>>> {
        let slot = self.inner.entries.get(key).map(|slot| Arc::clone(slot.value()))?;
        downcast(slot, key).ok()
    }

    /// Drop an entry that was evicted but is still in the map.
    pub(crate) fn purge_evicted(&self, key: &CacheKey) {
        self.inner.remove_entry(key);
    }

    fn slots(&self) -> Vec<Arc<dyn CacheSlot>> {
        self.inner
            .entries
            .iter()
            .map(|slot| Arc::clone(slot.value()))
            .collect()
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.entries.len())
            .field("endpoints", &self.inner.registry.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl CacheInner {
    /// Remove `key` if its entry is evicted. A fresh replacement is kept.
    pub(crate) fn remove_entry(&self, key: &CacheKey) {
        if self
            .entries
            .remove_if(key, |_, slot| slot.is_evicted())
            .is_some()
        {
            trace!(%key, "cache entry removed");
        }
    }
}

fn downcast<D: QueryDef>(
    slot: Arc<dyn CacheSlot>,
    key: &CacheKey,
) -> Result<Arc<QueryEntry<D>>, CoreError> {
    slot.as_any()
        .downcast::<QueryEntry<D>>()
        .map_err(|_| CoreError::Internal(format!("cache entry {key} has an unexpected type")))
}

#[cfg(test)]
mod tests;
