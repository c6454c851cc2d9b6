//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and config errors into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use recdesk_config::ConfigError;
use recdesk_core::CoreError;
use recdesk_core::recdesk_api::Error as ApiError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the records backend: {message}")]
    #[diagnostic(
        code(recdesk::connection_failed),
        help("Check that the backend is running and the server URL is right.")
    )]
    ConnectionFailed { message: String },

    #[error("TLS setup failed: {message}")]
    #[diagnostic(
        code(recdesk::tls_error),
        help(
            "Use --insecure (-k) for self-signed development backends,\n\
             or configure ca_cert in your profile."
        )
    )]
    TlsError { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(recdesk::auth_failed),
        help("Verify your username and password.\nRun: recdesk config set-password")
    )]
    AuthFailed { message: String },

    #[error("Session expired: {message}")]
    #[diagnostic(
        code(recdesk::session_expired),
        help("The refresh credential was rejected. Run the command again to log in.")
    )]
    SessionExpired { message: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(recdesk::no_credentials),
        help(
            "Store one with: recdesk config set-password --profile {profile}\n\
             Or set the RECDESK_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    #[error("Access denied ({status}): {message}")]
    #[diagnostic(code(recdesk::forbidden))]
    Forbidden { status: u16, message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(recdesk::not_found),
        help("Run: recdesk list {resource_type} to see available records")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({status}): {message}")]
    #[diagnostic(code(recdesk::api_error))]
    ApiError { status: u16, message: String },

    #[error("Unexpected response: {message}")]
    #[diagnostic(
        code(recdesk::bad_response),
        help("The backend answered with a shape this client does not understand.")
    )]
    BadResponse { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(recdesk::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(recdesk::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: recdesk config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(recdesk::no_config),
        help(
            "Create a profile with: recdesk config init\n\
             Or pass --server. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(recdesk::config))]
    Config(Box<figment::Error>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {millis}ms")]
    #[diagnostic(
        code(recdesk::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { millis: u64 },

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(recdesk::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(recdesk::json), help("Check the JSON contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(recdesk::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::TlsError { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::SessionExpired { .. } | Self::NoCredentials { .. } => {
                exit_code::AUTH
            }
            Self::Forbidden { .. } => exit_code::PERMISSION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } | Self::Json(_) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    /// Attach resource context to a 404.
    pub fn with_resource(self, resource_type: &str, identifier: &str) -> Self {
        match self {
            Self::ApiError { status: 404, .. } => Self::NotFound {
                resource_type: resource_type.into(),
                identifier: identifier.into(),
            },
            other => other,
        }
    }
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

// ── ConfigError → CliError ───────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Figment(err) => Self::Config(err),
            ConfigError::Io(err) => Self::Io(err),
            ConfigError::Serialization(err) => Self::Internal(err.to_string()),
        }
    }
}

// ── CoreError → CliError ─────────────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Api(api) => api.into(),
            CoreError::Config { message } => Self::Validation {
                field: "server".into(),
                reason: message,
            },
            CoreError::NotConnected => Self::ConnectionFailed {
                message: "not connected".into(),
            },
            CoreError::Serialization { message } => Self::Validation {
                field: "payload".into(),
                reason: message,
            },
            other @ (CoreError::DuplicateEndpoint { .. }
            | CoreError::Evicted { .. }
            | CoreError::Internal(_)) => Self::Internal(other.to_string()),
        }
    }
}

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Authentication { message } => Self::AuthFailed { message },
            ApiError::NotAuthenticated => Self::AuthFailed {
                message: "no active session".into(),
            },
            ApiError::AuthRefresh { message, .. } => Self::SessionExpired { message },
            ApiError::Network { message } => Self::ConnectionFailed { message },
            ApiError::InvalidUrl(err) => Self::Validation {
                field: "server".into(),
                reason: err.to_string(),
            },
            ApiError::Tls(message) => Self::TlsError { message },
            ApiError::Timeout { timeout_ms } => Self::Timeout { millis: timeout_ms },
            ApiError::Http {
                status,
                body,
                message,
            } => {
                let message = message.unwrap_or(body);
                if matches!(status, 401 | 403) {
                    Self::Forbidden { status, message }
                } else {
                    Self::ApiError { status, message }
                }
            }
            ApiError::Transform { message } => Self::BadResponse { message },
        }
    }
}
