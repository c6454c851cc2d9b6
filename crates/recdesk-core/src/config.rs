// ── Runtime desk configuration ──
//
// Describes how to reach one records backend and how the query cache
// behaves. Carries credentials but never touches disk: the CLI builds a
// `DeskConfig` from its profile and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use recdesk_api::{AuthPaths, TlsMode, TransportConfig};

use crate::cache::QueryConfig;

/// Username and password for the login endpoint.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Configuration for one backend connection.
#[derive(Debug, Clone)]
pub struct DeskConfig {
    /// API base URL (e.g., `https://records.local/api`).
    pub url: Url,
    /// Login credentials. `None` skips login; requests go out without a token.
    pub credentials: Option<Credentials>,
    pub tls: TlsMode,
    /// Per-request timeout.
    pub timeout: Duration,
    pub auth_paths: AuthPaths,
    pub query: QueryConfig,
}

impl DeskConfig {
    /// Defaults for everything but the URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            credentials: None,
            tls: TlsMode::default(),
            timeout: Duration::from_secs(30),
            auth_paths: AuthPaths::default(),
            query: QueryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password,
        });
        self
    }

    pub(crate) fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            ..TransportConfig::default()
        }
        .with_timeout(self.timeout)
        .with_cookie_jar()
    }
}
