//! Configuration for the recdesk CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `recdesk_core::DeskConfig`. The CLI layers its global
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use recdesk_core::{AuthPaths, Credentials, DeskConfig, QueryConfig, TlsMode};

/// Keyring service name; entries are keyed `<profile>/password`.
pub const KEYRING_SERVICE: &str = "recdesk";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named backend profile.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// API base URL (e.g., "https://records.local/api").
    pub server: String,

    pub username: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid certificates. Overrides `defaults.insecure`.
    pub insecure: Option<bool>,

    /// Request timeout in seconds. Overrides `defaults.timeout`.
    pub timeout: Option<u64>,

    pub login_path: Option<String>,
    pub refresh_path: Option<String>,
    pub logout_path: Option<String>,

    /// Cached results go stale after this long (humantime, e.g. "30s").
    pub stale_time: Option<String>,

    /// Unused cache entries are dropped after this long (humantime).
    pub keep_unused_for: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
/// `RECDESK_CONFIG` overrides it.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("RECDESK_CONFIG") {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "recdesk", "recdesk").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("recdesk");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Loading & saving ────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (missing file = defaults), then `RECDESK_`-prefixed
/// environment variables. Nested keys use `__`, e.g.
/// `RECDESK_DEFAULTS__TIMEOUT=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RECDESK_").split("__"));

    Ok(figment.extract()?)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the password for `profile_name`:
/// `RECDESK_PASSWORD` → `password_env` → keyring → plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_password_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        keyring_password,
    )
}

fn keyring_password(profile_name: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .ok()?
        .get_password()
        .ok()
}

fn resolve_password_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    if let Some(pw) = env("RECDESK_PASSWORD") {
        return Ok(SecretString::from(pw));
    }
    if let Some(pw) = profile.password_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(pw));
    }
    if let Some(pw) = keyring(profile_name) {
        return Ok(SecretString::from(pw));
    }
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Credentials for a profile. `None` when no username is configured
/// (neither in the profile nor in `RECDESK_USERNAME`).
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<Credentials>, ConfigError> {
    let Some(username) = profile
        .username
        .clone()
        .or_else(|| std::env::var("RECDESK_USERNAME").ok())
    else {
        return Ok(None);
    };

    let password = resolve_password(profile, profile_name)?;
    Ok(Some(Credentials { username, password }))
}

// ── Profile → DeskConfig ────────────────────────────────────────────

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{value}': {e}"),
    })
}

/// Query cache tuning from a profile.
pub fn query_config(profile: &Profile) -> Result<QueryConfig, ConfigError> {
    let mut query = QueryConfig::default();
    if let Some(ref stale) = profile.stale_time {
        query.stale_time = Some(parse_duration("stale_time", stale)?);
    }
    if let Some(ref keep) = profile.keep_unused_for {
        query.keep_unused_for = parse_duration("keep_unused_for", keep)?;
    }
    Ok(query)
}

/// Auth endpoint paths, falling back to the `/auth/*` defaults.
pub fn auth_paths(profile: &Profile) -> AuthPaths {
    let defaults = AuthPaths::default();
    AuthPaths {
        login: profile.login_path.clone().unwrap_or(defaults.login),
        refresh: profile.refresh_path.clone().unwrap_or(defaults.refresh),
        logout: profile.logout_path.clone().unwrap_or(defaults.logout),
    }
}

/// Build a `DeskConfig` from a profile, without CLI flag overrides.
pub fn profile_to_desk_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<DeskConfig, ConfigError> {
    let url: url::Url = profile.server.parse().map_err(|_| ConfigError::Validation {
        field: "server".into(),
        reason: format!("invalid URL: {}", profile.server),
    })?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    let mut config = DeskConfig::new(url);
    config.credentials = resolve_credentials(profile, profile_name)?;
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.auth_paths = auth_paths(profile);
    config.query = query_config(profile)?;
    Ok(config)
}
