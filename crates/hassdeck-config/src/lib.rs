//! Shared configuration for hassdeck front-ends.
//!
//! TOML profiles layered with `HASSDECK_` environment variables, access
//! token resolution (env var, system keyring, plaintext), and translation to
//! [`hassdeck_core::ConnectionConfig`]. The CLI adds flag overrides on top.

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

use hassdeck_core::ConnectionConfig;

/// Port the hub listens on unless a profile says otherwise.
pub const DEFAULT_PORT: u16 = 8123;

/// Keyring service name; entries are keyed `{profile}/token`.
pub const KEYRING_SERVICE: &str = "hassdeck";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("no access token configured for profile '{profile}'")]
    NoToken { profile: String },

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
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named hub profiles.
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

impl Config {
    /// Pick a profile: the given name, else `default_profile`, else
    /// `"default"`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_true")]
    pub use_tls: bool,

    #[serde(default = "default_true")]
    pub verify_certificate: bool,

    /// Seconds between reconnect attempts.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,

    #[serde(default = "default_output")]
    pub output: String,

    /// Seconds the CLI waits for the hub to become ready.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            use_tls: true,
            verify_certificate: true,
            reconnect_interval_secs: default_reconnect_interval(),
            output: default_output(),
            timeout: default_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_reconnect_interval() -> u64 {
    5
}
fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    10
}

/// A named hub profile. Unset options fall back to [`Defaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Hostname or IP, no scheme (e.g., "homeassistant.local").
    pub host: String,

    pub port: Option<u16>,

    pub use_tls: Option<bool>,

    pub verify_certificate: Option<bool>,

    /// Long-lived access token (plaintext, prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    pub reconnect_interval_secs: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "hassdeck", "hassdeck").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hassdeck");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Nested keys use a double underscore:
/// `HASSDECK_PROFILES__HOME__HOST=hub.lan`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HASSDECK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

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

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the access token: `token_env` → keyring → plaintext.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoToken {
        profile: profile_name.into(),
    })
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

/// Build a `ConnectionConfig` from a profile, no flag overrides.
pub fn profile_to_connection_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ConnectionConfig, ConfigError> {
    let host = profile.host.trim();
    if host.is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: format!("profile '{profile_name}' has no host"),
        });
    }
    if host.contains("://") {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: format!("expected a bare hostname, got '{host}'"),
        });
    }

    let token = resolve_token(profile, profile_name)?;
    let interval = profile
        .reconnect_interval_secs
        .unwrap_or(defaults.reconnect_interval_secs)
        .max(1);

    Ok(ConnectionConfig {
        host: host.to_owned(),
        port: Some(profile.port.unwrap_or(DEFAULT_PORT)),
        use_tls: profile.use_tls.unwrap_or(defaults.use_tls),
        verify_certificate: profile
            .verify_certificate
            .unwrap_or(defaults.verify_certificate),
        token,
        reconnect_interval: Duration::from_secs(interval),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn profile(host: &str) -> Profile {
        Profile {
            host: host.into(),
            token: Some("plain".into()),
            ..Profile::default()
        }
    }

    #[test]
    fn profile_inherits_defaults() {
        let defaults = Defaults {
            use_tls: false,
            reconnect_interval_secs: 9,
            ..Defaults::default()
        };
        let config = profile_to_connection_config(&profile("hub.lan"), "lab", &defaults).unwrap();

        assert_eq!(config.host, "hub.lan");
        assert_eq!(config.port, Some(DEFAULT_PORT));
        assert!(!config.use_tls);
        assert!(config.verify_certificate);
        assert_eq!(config.reconnect_interval, Duration::from_secs(9));
        assert_eq!(config.token.expose_secret(), "plain");
    }

    #[test]
    fn profile_overrides_win() {
        let p = Profile {
            port: Some(443),
            use_tls: Some(true),
            verify_certificate: Some(false),
            reconnect_interval_secs: Some(0),
            ..profile(" hub.lan ")
        };
        let config = profile_to_connection_config(&p, "lab", &Defaults::default()).unwrap();
        assert_eq!(config.host, "hub.lan");
        assert_eq!(config.port, Some(443));
        assert!(!config.verify_certificate);
        assert_eq!(config.reconnect_interval, Duration::from_secs(1));
    }

    #[test]
    fn host_must_be_bare() {
        for host in ["", "   ", "https://hub.lan"] {
            let err = profile_to_connection_config(&profile(host), "lab", &Defaults::default())
                .unwrap_err();
            assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "host"));
        }
    }

    #[test]
    fn profile_selection() {
        let mut config = Config::default();
        config.profiles.insert("default".into(), profile("a"));
        config.profiles.insert("lab".into(), profile("b"));

        assert_eq!(config.profile(None).unwrap().1.host, "a");
        assert_eq!(config.profile(Some("lab")).unwrap().0, "lab");
        config.default_profile = Some("lab".into());
        assert_eq!(config.profile(None).unwrap().1.host, "b");
        assert!(matches!(
            config.profile(Some("nope")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }
}
