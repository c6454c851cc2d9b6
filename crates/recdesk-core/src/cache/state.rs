// ── Query state snapshots ──

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::CoreError;

/// Lifecycle of one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Created, nothing requested yet.
    Uninitialized,
    /// First fetch in flight, no data yet.
    Loading,
    Success,
    Error,
}

/// What a subscriber sees. Data is shared, never copied.
#[derive(Debug)]
pub struct QueryState<T> {
    pub status: QueryStatus,
    /// Last successful value. Kept across later failures and refetches.
    pub data: Option<Arc<T>>,
    /// Error of the latest completed fetch, if it failed.
    pub error: Option<CoreError>,
    /// A fetch for this key is in flight.
    pub is_fetching: bool,
    /// Invalidated (or expired) since the last successful fetch.
    pub is_stale: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl<T> QueryState<T> {
    pub(crate) fn uninitialized() -> Self {
        Self {
            status: QueryStatus::Uninitialized,
            data: None,
            error: None,
            is_fetching: false,
            is_stale: false,
            last_fetched_at: None,
        }
    }

    /// First load: fetching with nothing to show yet.
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_uninitialized(&self) -> bool {
        self.status == QueryStatus::Uninitialized
    }

    /// No fetch in flight and at least one fetch completed.
    pub fn is_settled(&self) -> bool {
        !self.is_fetching && matches!(self.status, QueryStatus::Success | QueryStatus::Error)
    }
}

// Manual impl: `T` itself need not be `Clone`.
impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            is_fetching: self.is_fetching,
            is_stale: self.is_stale,
            last_fetched_at: self.last_fetched_at,
        }
    }
}

/// Per-subscriber refetch behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// `Duration::ZERO` disables polling. The entry polls at the smallest
    /// non-zero interval among its subscribers.
    pub polling_interval: Duration,
    pub refetch_on_focus: bool,
    pub refetch_on_reconnect: bool,
    /// Fetch on attach (and on argument change) even if the entry is fresh.
    pub refetch_on_mount_or_arg_change: bool,
}

impl SubscribeOptions {
    pub fn polling(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn refetch_on_focus(mut self) -> Self {
        self.refetch_on_focus = true;
        self
    }

    pub fn refetch_on_reconnect(mut self) -> Self {
        self.refetch_on_reconnect = true;
        self
    }

    pub fn refetch_on_mount(mut self) -> Self {
        self.refetch_on_mount_or_arg_change = true;
        self
    }
}
