// ── Desk facade ──
//
// Connection lifecycle for one records backend: builds the transport,
// session, reauthenticating client and query cache from a `DeskConfig`,
// registers every office resource, and tracks connection state.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use recdesk_api::{ApiClient, Error as ApiError};

use crate::cache::QueryCache;
use crate::config::DeskConfig;
use crate::error::CoreError;
use crate::resources::OfficeApi;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

// ── Desk ─────────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable. [`connect()`](Self::connect) logs in when the config
/// carries credentials; [`disconnect()`](Self::disconnect) logs out and
/// drops every cached query.
#[derive(Clone)]
pub struct Desk {
    inner: Arc<DeskInner>,
}

struct DeskInner {
    config: DeskConfig,
    client: ApiClient,
    cache: QueryCache,
    api: OfficeApi,
    connection_state: watch::Sender<ConnectionState>,
}

impl Desk {
    /// Build the client stack. Does NOT connect.
    pub fn new(config: DeskConfig) -> Result<Self, CoreError> {
        if config.url.cannot_be_a_base() || !matches!(config.url.scheme(), "http" | "https") {
            return Err(CoreError::Config {
                message: format!("not an http(s) base URL: {}", config.url),
            });
        }

        let client = ApiClient::http(
            config.url.clone(),
            &config.transport_config(),
            config.auth_paths.clone(),
        )?;
        let cache = QueryCache::new(client.clone(), config.query.clone());
        let api = OfficeApi::register(&cache)?;
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            inner: Arc::new(DeskInner {
                config,
                client,
                cache,
                api,
                connection_state,
            }),
        })
    }

    pub fn config(&self) -> &DeskConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Log in if credentials are configured, then mark the desk connected.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.inner
            .connection_state
            .send_replace(ConnectionState::Connecting);

        if let Some(credentials) = &self.inner.config.credentials {
            if let Err(err) = self
                .inner
                .client
                .login(&credentials.username, &credentials.password)
                .await
            {
                self.inner
                    .connection_state
                    .send_replace(ConnectionState::Failed);
                return Err(err.into());
            }
        } else {
            debug!("no credentials configured; connecting without a session");
        }

        self.inner
            .connection_state
            .send_replace(ConnectionState::Connected);
        info!(url = %self.inner.config.url, "connected");
        Ok(())
    }

    /// Log out (best effort) and reset the cache. Live subscriptions see
    /// [`CoreError::Evicted`].
    pub async fn disconnect(&self) {
        match self.inner.client.logout().await {
            Ok(()) | Err(ApiError::NotAuthenticated) => {}
            Err(err) => warn!(error = %err, "logout failed (non-fatal)"),
        }

        self.inner.cache.reset();
        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// Connect, run `f`, disconnect. The disconnect happens whether or not
    /// `f` succeeds.
    pub async fn oneshot<F, Fut, T>(config: DeskConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Desk) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let desk = Desk::new(config)?;
        desk.connect().await?;
        let result = f(desk.clone()).await;
        desk.disconnect().await;
        result
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Registered resource endpoints. Fails unless connected.
    pub fn api(&self) -> Result<&OfficeApi, CoreError> {
        if *self.inner.connection_state.borrow() != ConnectionState::Connected {
            return Err(CoreError::NotConnected);
        }
        Ok(&self.inner.api)
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    // ── Refetch triggers ─────────────────────────────────────────────

    /// The consumer regained focus.
    pub fn notify_focus(&self) {
        self.inner.cache.on_focus();
    }

    /// Network connectivity came back.
    pub fn notify_reconnect(&self) {
        self.inner.cache.on_reconnect();
    }
}

impl std::fmt::Debug for Desk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Desk")
            .field("url", &self.inner.config.url.as_str())
            .field("state", &*self.inner.connection_state.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        let config = DeskConfig::new("mailto:clerk@records.local".parse().unwrap());
        assert!(matches!(Desk::new(config), Err(CoreError::Config { .. })));
    }

    #[tokio::test]
    async fn api_requires_connection() {
        let desk = Desk::new(DeskConfig::new("http://127.0.0.1:1/api".parse().unwrap())).unwrap();
        assert!(matches!(desk.api(), Err(CoreError::NotConnected)));
        assert_eq!(*desk.connection_state().borrow(), ConnectionState::Disconnected);

        // No credentials: connecting makes no network call.
        desk.connect().await.unwrap();
        assert!(desk.api().is_ok());
        assert_eq!(desk.cache().endpoint_count(), 45);

        desk.disconnect().await;
        assert!(matches!(desk.api(), Err(CoreError::NotConnected)));
    }
}
