// ── Runtime connection configuration ──
//
// Describes *where* the hub lives and how to authenticate. Carries the
// access token but never touches disk; the config crate or the embedding
// host builds a `ConnectionConfig` and hands it in.

use std::time::Duration;

use hassdeck_api::{ChannelConfig, DEFAULT_RETRY_INTERVAL, TlsMode};
use secrecy::{ExposeSecret, SecretString};

use crate::error::CoreError;

/// Configuration for connecting to a single hub.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Hostname or IP address, without scheme.
    pub host: String,
    pub port: Option<u16>,
    pub use_tls: bool,
    /// Only meaningful with `use_tls`; `false` accepts self-signed certs.
    pub verify_certificate: bool,
    /// Long-lived access token.
    pub token: SecretString,
    /// Constant delay between reconnect attempts and `get_config` polls.
    pub reconnect_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            use_tls: true,
            verify_certificate: true,
            token: SecretString::from(String::new()),
            reconnect_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
            token: SecretString::from(token.into()),
            ..Self::default()
        }
    }

    /// Host, port and token are all present.
    pub fn is_complete(&self) -> bool {
        !self.host.trim().is_empty()
            && self.port.is_some_and(|p| p != 0)
            && !self.token.expose_secret().trim().is_empty()
    }

    /// Names of the settings that keep this config from being complete.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if !self.port.is_some_and(|p| p != 0) {
            missing.push("port");
        }
        if self.token.expose_secret().trim().is_empty() {
            missing.push("token");
        }
        missing
    }

    pub fn tls_mode(&self) -> TlsMode {
        TlsMode::from_flags(self.use_tls, self.verify_certificate)
    }

    /// Build the per-socket channel configuration.
    pub fn channel_config(&self) -> Result<ChannelConfig, CoreError> {
        let port = match self.port {
            Some(port) if port != 0 => port,
            _ => {
                return Err(CoreError::Config {
                    message: "hub port is not set".into(),
                });
            }
        };
        let config = ChannelConfig::new(&self.host, port, self.tls_mode(), self.token.clone())?;
        Ok(config.with_retry_interval(self.reconnect_interval))
    }
}
