// ── Core error types ──
//
// Errors surfaced by the query cache and the `Desk` facade. Transport
// failures keep their `recdesk_api::Error` shape so consumers can still
// match on status codes; everything else is a cache or registry problem.
// `Clone` because one fetch result is fanned out to every subscriber.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Transport errors (wrapped as-is) ────────────────────────────
    #[error(transparent)]
    Api(#[from] recdesk_api::Error),

    // ── Registry errors ─────────────────────────────────────────────
    #[error("Endpoint already registered: {name}")]
    DuplicateEndpoint { name: String },

    // ── Cache errors ────────────────────────────────────────────────
    #[error("Cache entry {key} was evicted")]
    Evicted { key: String },

    #[error("Failed to serialize endpoint argument: {message}")]
    Serialization { message: String },

    // ── Lifecycle errors ────────────────────────────────────────────
    #[error("Not connected to the records backend")]
    NotConnected,

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ─────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// A response that did not match the shape an endpoint expects.
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Api(recdesk_api::Error::Transform {
            message: message.into(),
        })
    }

    /// The HTTP status behind this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(err) => err.status(),
            _ => None,
        }
    }

    /// Server-supplied message, if the backend sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Api(err) => err.server_message(),
            _ => None,
        }
    }

    /// Whether a fresh login is required to continue.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::Api(err) if err.is_session_lost())
    }

    pub fn is_transform(&self) -> bool {
        matches!(self, Self::Api(recdesk_api::Error::Transform { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(err) if err.is_not_found())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
