// Reauthenticating client
//
// Wraps a `Transport`. A call rejected with 403 (the backend's "access
// token expired" signal) triggers one silent refresh through the refresh
// endpoint and is then replayed exactly once; the replay's outcome is
// final. Concurrent 403s share a single in-flight refresh.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::AuthPaths;
use crate::error::Error;
use crate::session::Session;
use crate::transport::{HttpTransport, RawResponse, RequestSpec, Transport, TransportConfig};

type RefreshFlight = Shared<BoxFuture<'static, Result<(), Error>>>;
type RefreshSlot = Arc<Mutex<Option<RefreshFlight>>>;

/// Client that attaches the session token and transparently refreshes it.
///
/// Cheaply cloneable; clones share the transport, session, and the
/// in-flight refresh slot.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    session: Session,
    paths: AuthPaths,
    refresh_slot: RefreshSlot,
}

impl ApiClient {
    /// Create a client over an arbitrary transport.
    ///
    /// `session` must be the same session the transport reads its bearer
    /// token from.
    pub fn new(transport: Arc<dyn Transport>, session: Session, paths: AuthPaths) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                session,
                paths,
                refresh_slot: Arc::new(Mutex::new(None)),
            }),
        }
    }

    /// Create a client backed by [`HttpTransport`] with a fresh session.
    pub fn http(base_url: Url, config: &TransportConfig, paths: AuthPaths) -> Result<Self, Error> {
        let session = Session::new();
        let transport = HttpTransport::new(base_url, session.clone(), config)?;
        Ok(Self::new(Arc::new(transport), session, paths))
    }

    /// The session shared with the transport.
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// The auth endpoint paths.
    pub fn paths(&self) -> &AuthPaths {
        &self.inner.paths
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    /// Perform a request, refreshing the access token once on 403.
    ///
    /// At most one refresh and one replay happen per call. If the token
    /// was already rotated by a concurrent refresh while this request was
    /// in flight, the request is replayed without refreshing again.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<RawResponse, Error> {
        let sent_with = self.inner.session.generation();

        match self.inner.transport.send(spec).await {
            Err(err) if err.is_auth_expired() && spec.bearer => {
                if self.inner.session.generation() == sent_with {
                    debug!(path = %spec.path, "access token rejected, refreshing");
                    self.refresh().await?;
                } else if !self.inner.session.is_authenticated() {
                    // A concurrent refresh failed (or a logout happened);
                    // replaying without a token cannot succeed.
                    debug!(path = %spec.path, "session cleared concurrently, not replaying");
                    return Err(Error::AuthRefresh {
                        message: "session expired -- log in again".into(),
                        status: err.status(),
                    });
                } else {
                    debug!(path = %spec.path, "access token rotated concurrently, replaying");
                }
                self.inner.transport.send(spec).await
            }
            other => other,
        }
    }

    /// Obtain a new access token using the refresh credential.
    ///
    /// Joins the in-flight refresh if one is already running, so
    /// concurrent callers trigger a single network call. On failure the
    /// session is cleared.
    pub async fn refresh(&self) -> Result<(), Error> {
        let flight = {
            let mut slot = self
                .inner
                .refresh_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(existing) = slot.as_ref() {
                debug!("joining in-flight token refresh");
                existing.clone()
            } else {
                let flight = run_refresh(
                    Arc::clone(&self.inner.transport),
                    self.inner.session.clone(),
                    self.inner.paths.refresh.clone(),
                    Arc::clone(&self.inner.refresh_slot),
                )
                .boxed()
                .shared();
                *slot = Some(flight.clone());
                flight
            }
        };

        flight.await
    }

    /// Whether the session currently holds an access token.
    pub fn is_authenticated(&self) -> bool {
        self.inner.session.is_authenticated()
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("session", &self.inner.session)
            .field("paths", &self.inner.paths)
            .finish_non_exhaustive()
    }
}

/// The body of one refresh flight. Clears the shared slot when done so the
/// next expiry starts a new flight.
async fn run_refresh(
    transport: Arc<dyn Transport>,
    session: Session,
    path: String,
    slot: RefreshSlot,
) -> Result<(), Error> {
    let spec = RequestSpec::post(path).with_credentials().without_bearer();

    let outcome = match transport.send(&spec).await {
        Ok(raw) => extract_access_token(&raw.body).ok_or(Error::AuthRefresh {
            message: "refresh response carried no access token".into(),
            status: Some(raw.status),
        }),
        Err(err) => Err(Error::AuthRefresh {
            message: format!("session expired -- log in again ({err})"),
            status: err.status(),
        }),
    };

    let result = match outcome {
        Ok(token) => {
            session.set_token(token);
            info!("access token refreshed");
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, "token refresh failed, clearing session");
            session.clear();
            Err(err)
        }
    };

    *slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    result
}

/// Pull the access token out of a login/refresh response body.
pub(crate) fn extract_access_token(body: &Value) -> Option<SecretString> {
    ["accessToken", "access_token", "token"]
        .iter()
        .find_map(|field| body.get(field).and_then(Value::as_str))
        .filter(|token| !token.is_empty())
        .map(|token| SecretString::from(token.to_owned()))
}
