// ── Mutations ──
//
// A mutation runs through the same reauthenticating client as queries and,
// on success only, invalidates the tags its definition names.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{CacheKey, QueryCache};
use crate::endpoint::{MutationDef, run_endpoint};
use crate::error::CoreError;

/// A registered mutation, bound to its cache.
pub struct MutationEndpoint<D: MutationDef> {
    def: Arc<D>,
    cache: QueryCache,
}

impl<D: MutationDef> Clone for MutationEndpoint<D> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
            cache: self.cache.clone(),
        }
    }
}

impl<D: MutationDef> MutationEndpoint<D> {
    pub(crate) fn new(def: Arc<D>, cache: QueryCache) -> Self {
        Self { def, cache }
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn definition(&self) -> &D {
        &self.def
    }

    /// Run the mutation. On success the definition's tags are invalidated;
    /// a failed mutation leaves the cache untouched.
    pub async fn trigger(&self, arg: D::Arg) -> Result<Arc<D::Output>, CoreError> {
        let output = match run_endpoint(self.cache.client(), self.def.as_ref(), &arg).await {
            Ok(output) => output,
            Err(err) => {
                warn!(endpoint = self.def.name(), error = %err, "mutation failed");
                return Err(err);
            }
        };

        let tags = self.def.invalidates_tags(&output, &arg);
        let refreshed: Vec<CacheKey> = self.cache.invalidate_tags(&tags);
        debug!(
            endpoint = self.def.name(),
            invalidated = refreshed.len(),
            "mutation succeeded"
        );
        Ok(Arc::new(output))
    }

    /// A stateful handle that records the outcome of its last trigger.
    pub fn tracker(&self) -> MutationTracker<D> {
        let (state, _) = watch::channel(MutationState::Idle);
        MutationTracker {
            endpoint: self.clone(),
            state,
        }
    }
}

impl<D: MutationDef> fmt::Debug for MutationEndpoint<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationEndpoint")
            .field("name", &self.def.name())
            .finish_non_exhaustive()
    }
}

// ── MutationState ────────────────────────────────────────────────────

/// Outcome of the last trigger on a [`MutationTracker`].
#[derive(Debug)]
pub enum MutationState<T> {
    Idle,
    Loading,
    Success(Arc<T>),
    Error(CoreError),
}

impl<T> MutationState<T> {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn data(&self) -> Option<&Arc<T>> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CoreError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl<T> Clone for MutationState<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Idle => Self::Idle,
            Self::Loading => Self::Loading,
            Self::Success(data) => Self::Success(Arc::clone(data)),
            Self::Error(err) => Self::Error(err.clone()),
        }
    }
}

// ── MutationTracker ──────────────────────────────────────────────────

/// Trigger plus observable state, one per consumer.
pub struct MutationTracker<D: MutationDef> {
    endpoint: MutationEndpoint<D>,
    state: watch::Sender<MutationState<D::Output>>,
}

impl<D: MutationDef> MutationTracker<D> {
    /// Run the mutation, publishing `Loading` then the outcome.
    pub async fn trigger(&self, arg: D::Arg) -> Result<Arc<D::Output>, CoreError> {
        self.state.send_replace(MutationState::Loading);
        let result = self.endpoint.trigger(arg).await;
        self.state.send_replace(match &result {
            Ok(data) => MutationState::Success(Arc::clone(data)),
            Err(err) => MutationState::Error(err.clone()),
        });
        result
    }

    pub fn state(&self) -> MutationState<D::Output> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<D::Output>> {
        self.state.subscribe()
    }

    /// Back to `Idle`.
    pub fn reset(&self) {
        self.state.send_replace(MutationState::Idle);
    }
}

impl<D: MutationDef> fmt::Debug for MutationTracker<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationTracker")
            .field("endpoint", &self.endpoint.name())
            .finish_non_exhaustive()
    }
}
