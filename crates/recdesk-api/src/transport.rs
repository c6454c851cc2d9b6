// Single-exchange HTTP transport
//
// `Transport` is the seam between the reauthenticating client and the
// network. `HttpTransport` is the reqwest implementation: it resolves
// paths against the backend base URL, attaches the session's bearer
// token, and normalizes every outcome into `RawResponse` or `Error`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Method;
use reqwest::cookie::Jar;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::session::Session;

// ── Request / response ──────────────────────────────────────────────

/// Everything needed to perform one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    /// Path relative to the backend base URL, e.g. `/assets/a1`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Send through the cookie-carrying client (refresh credential).
    pub include_credentials: bool,
    /// Attach `Authorization: Bearer <token>` when the session holds one.
    pub bearer: bool,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            include_credentials: false,
            bearer: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Append an extra header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send cookies (the refresh credential) with this request.
    pub fn with_credentials(mut self) -> Self {
        self.include_credentials = true;
        self
    }

    /// Never attach the access token (refresh and login calls).
    pub fn without_bearer(mut self) -> Self {
        self.bearer = false;
        self
    }
}

/// A successful (2xx) response with its body parsed as JSON.
///
/// An empty body is represented as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
}

impl RawResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

// ── Transport trait ─────────────────────────────────────────────────

/// Performs one HTTP exchange. Implementations must never panic; every
/// failure (network, timeout, non-2xx, malformed body) is an `Error`.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, spec: &'a RequestSpec) -> BoxFuture<'a, Result<RawResponse, Error>>;
}

// ── Client configuration ────────────────────────────────────────────

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (self-signed development backends).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
    pub cookie_jar: Option<Arc<Jar>>,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            cookie_jar: None,
            user_agent: concat!("recdesk/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// When `with_cookies` is set the client stores and sends cookies
    /// through the configured jar.
    pub fn build_client(&self, with_cookies: bool) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str());

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        if with_cookies {
            if let Some(ref jar) = self.cookie_jar {
                builder = builder.cookie_provider(Arc::clone(jar));
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Create a config with a fresh cookie jar.
    pub fn with_cookie_jar(mut self) -> Self {
        self.cookie_jar = Some(Arc::new(Jar::default()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ── reqwest implementation ──────────────────────────────────────────

/// HTTP transport bound to one backend and one session.
pub struct HttpTransport {
    base_url: Url,
    session: Session,
    http: reqwest::Client,
    http_with_credentials: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for `base_url` (e.g. `https://records.local/api`).
    ///
    /// If the config doesn't already include a cookie jar one is created;
    /// the refresh credential lives there.
    pub fn new(base_url: Url, session: Session, config: &TransportConfig) -> Result<Self, Error> {
        let config = if config.cookie_jar.is_some() {
            config.clone()
        } else {
            config.clone().with_cookie_jar()
        };

        Ok(Self {
            base_url,
            session,
            http: config.build_client(false)?,
            http_with_credentials: config.build_client(true)?,
            timeout: config.timeout,
        })
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The session whose token this transport attaches.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Resolve a request path against the base URL, keeping any base path.
    pub(crate) fn url_for(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    async fn exchange(&self, spec: &RequestSpec) -> Result<RawResponse, Error> {
        let url = self.url_for(&spec.path)?;
        debug!(method = %spec.method, %url, "sending request");

        let http = if spec.include_credentials {
            &self.http_with_credentials
        } else {
            &self.http
        };

        let mut builder = http.request(spec.method.clone(), url);
        if !spec.query.is_empty() {
            builder = builder.query(&spec.query);
        }
        for (name, value) in &spec.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if spec.bearer {
            if let Some(token) = self.session.token() {
                builder = builder.bearer_auth(token.expose_secret());
            }
        }
        if let Some(ref body) = spec.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| Error::from_reqwest(&e, self.timeout))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::from_reqwest(&e, self.timeout))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), path = %spec.path, "request rejected");
            return Err(Error::http(status.as_u16(), &text));
        }

        trace!(status = status.as_u16(), bytes = text.len(), "response received");

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                let preview: String = text.chars().take(200).collect();
                Error::Transform {
                    message: format!("{e} (body preview: {preview:?})"),
                }
            })?
        };

        Ok(RawResponse::new(status.as_u16(), body))
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, spec: &'a RequestSpec) -> BoxFuture<'a, Result<RawResponse, Error>> {
        Box::pin(self.exchange(spec))
    }
}
