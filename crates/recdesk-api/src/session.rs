// Access-token session
//
// One `Session` is shared (by handle) between the transport, which reads
// the token for every request, and the client, which writes it on login,
// refresh and logout. The generation counter lets a caller tell whether
// the token was rotated while its request was in flight.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use secrecy::SecretString;

/// Handle to the current access token. Cloning yields the same session.
#[derive(Clone, Default)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Default)]
struct SessionInner {
    token: ArcSwapOption<SecretString>,
    generation: AtomicU64,
}

impl Session {
    /// An empty (logged-out) session.
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that already holds a token.
    pub fn with_token(token: SecretString) -> Self {
        let session = Self::new();
        session.set_token(token);
        session
    }

    /// The current access token, if any.
    pub fn token(&self) -> Option<Arc<SecretString>> {
        self.inner.token.load_full()
    }

    /// Whether an access token is currently held.
    pub fn is_authenticated(&self) -> bool {
        self.inner.token.load().is_some()
    }

    /// Monotonic counter bumped on every token change.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Replace the access token (login or refresh success).
    pub fn set_token(&self, token: SecretString) {
        self.inner.token.store(Some(Arc::new(token)));
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop the access token (logout or irrecoverable refresh failure).
    pub fn clear(&self) {
        self.inner.token.store(None);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("generation", &self.generation())
            .finish()
    }
}
