// Login / logout against the records backend
//
// Login posts the credentials with cookies enabled: the backend answers
// with the access token in the body and sets the refresh credential as a
// cookie, which the transport's jar keeps for later refresh calls.

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{ApiClient, extract_access_token};
use crate::error::Error;
use crate::transport::RequestSpec;

/// Paths of the authentication endpoints, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPaths {
    pub login: String,
    pub refresh: String,
    pub logout: String,
}

impl Default for AuthPaths {
    fn default() -> Self {
        Self {
            login: "/auth/login".into(),
            refresh: "/auth/refresh".into(),
            logout: "/auth/logout".into(),
        }
    }
}

impl ApiClient {
    /// Authenticate with username and password.
    ///
    /// Bypasses the refresh-and-retry path: a rejected login is reported as
    /// [`Error::Authentication`], never refreshed.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        let spec = RequestSpec::post(self.paths().login.clone())
            .with_body(json!({
                "username": username,
                "password": password.expose_secret(),
            }))
            .with_credentials()
            .without_bearer();

        debug!(username, "logging in");
        let raw = self.transport().send(&spec).await.map_err(|err| match err {
            Error::Http {
                status, message, ..
            } => Error::Authentication {
                message: message.unwrap_or_else(|| format!("login rejected (HTTP {status})")),
            },
            other => other,
        })?;

        let token = extract_access_token(&raw.body).ok_or_else(|| Error::Authentication {
            message: "login response carried no access token".into(),
        })?;

        self.session().set_token(token);
        info!(username, "logged in");
        Ok(())
    }

    /// End the session on the backend. The local session is cleared even
    /// when the backend call fails.
    pub async fn logout(&self) -> Result<(), Error> {
        if !self.is_authenticated() {
            return Err(Error::NotAuthenticated);
        }

        let spec = RequestSpec::post(self.paths().logout.clone()).with_credentials();
        let result = self.transport().send(&spec).await.map(|_| ());
        self.session().clear();

        match &result {
            Ok(()) => info!("logged out"),
            Err(err) => warn!(error = %err, "logout call failed; local session cleared anyway"),
        }
        result
    }
}
