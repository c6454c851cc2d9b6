use std::time::Duration;

use thiserror::Error;

/// Maximum number of characters of a response body kept on an error.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Top-level error type for the `recdesk-api` crate.
///
/// Every failure is a value: the transport and the client never panic.
/// The type is `Clone` because a single in-flight request (or refresh)
/// may be awaited by several callers that all receive the same outcome.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login was rejected or returned no usable access token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The operation needs a logged-in session and none is held.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The silent refresh call failed or returned no usable token.
    #[error("Access token refresh failed: {message}")]
    AuthRefresh {
        message: String,
        status: Option<u16>,
    },

    // ── Transport ───────────────────────────────────────────────────
    /// No response reached us (connection refused, DNS failure, reset).
    #[error("Network error: {message}")]
    Network { message: String },

    /// Request timed out.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration or handshake error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// The server answered with a non-2xx status.
    ///
    /// `message` is the server-supplied `message` field when the body is JSON.
    #[error("HTTP {status}: {}", message.as_deref().unwrap_or("request rejected"))]
    Http {
        status: u16,
        body: String,
        message: Option<String>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// The response body did not have the expected shape.
    #[error("Unexpected response shape: {message}")]
    Transform { message: String },
}

impl Error {
    /// Build an [`Error::Http`] from a status code and a raw body.
    pub fn http(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| {
                json.get("message")
                    .or_else(|| json.get("error"))
                    .and_then(|m| m.as_str())
                    .map(str::to_owned)
            });

        Self::Http {
            status,
            body: truncate_body(body),
            message,
        }
    }

    /// Translate a reqwest failure. Timeouts keep the configured duration.
    pub fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: String::new(),
                message: None,
            }
        } else if err.is_decode() {
            Self::Transform {
                message: err.to_string(),
            }
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::AuthRefresh { status, .. } => *status,
            _ => None,
        }
    }

    /// Server-supplied message, if the backend sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Http { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` if this is the backend's "access token expired" signal.
    ///
    /// The backend answers 403 (not 401) for an expired or invalid token.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Http { status: 403, .. })
    }

    /// Returns `true` if the session is gone and a fresh login is required.
    pub fn is_session_lost(&self) -> bool {
        matches!(
            self,
            Self::AuthRefresh { .. } | Self::Authentication { .. } | Self::NotAuthenticated
        )
    }

    /// Returns `true` if this is a transient error worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.to_owned()
    } else {
        let head: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{head}... (truncated, {} total bytes)", body.len())
    }
}
