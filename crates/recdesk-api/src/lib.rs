// recdesk-api: bearer-token transport and reauthenticating client for the records backend

pub mod auth;
pub mod client;
pub mod error;
pub mod session;
pub mod transport;

pub use auth::AuthPaths;
pub use client::ApiClient;
pub use error::Error;
pub use session::Session;
pub use transport::{HttpTransport, RawResponse, RequestSpec, TlsMode, Transport, TransportConfig};

// Re-exported so endpoint definitions don't need a direct reqwest dependency.
pub use reqwest::Method;
