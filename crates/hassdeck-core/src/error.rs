// ── Core error types ──
//
// Domain errors from hassdeck-core. Consumers never see raw socket or JSON
// failures; the `From<hassdeck_api::Error>` impl maps transport errors onto
// these variants. Every field is owned text so errors can be cloned into
// state snapshots.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to hub at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Hub disconnected")]
    Disconnected,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Invalid entity id '{entity_id}': expected <domain>.<name>")]
    InvalidEntityId { entity_id: String },

    #[error("Request rejected by hub: {message}")]
    Request { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hassdeck_api::Error> for CoreError {
    fn from(err: hassdeck_api::Error) -> Self {
        match err {
            hassdeck_api::Error::AuthRejected { message } => {
                CoreError::AuthenticationFailed { message }
            }
            hassdeck_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid hub address: {e}"),
            },
            hassdeck_api::Error::Tls(message) => CoreError::Config {
                message: format!("TLS setup failed: {message}"),
            },
            hassdeck_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: "<hub>".into(),
                reason,
            },
            hassdeck_api::Error::WebSocketClosed { .. } | hassdeck_api::Error::NotConnected => {
                CoreError::Disconnected
            }
            hassdeck_api::Error::Serialization(e) => CoreError::Request {
                message: format!("malformed frame: {e}"),
            },
        }
    }
}

impl CoreError {
    /// Returns `true` if a later reconnect attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_rejection_maps_to_authentication_failed() {
        let err = CoreError::from(hassdeck_api::Error::AuthRejected {
            message: "Invalid access token".into(),
        });
        assert_eq!(
            err,
            CoreError::AuthenticationFailed {
                message: "Invalid access token".into()
            }
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn socket_failures_are_transient() {
        let closed = CoreError::from(hassdeck_api::Error::WebSocketClosed {
            code: 1000,
            reason: String::new(),
        });
        assert_eq!(closed, CoreError::Disconnected);
        assert!(closed.is_transient());

        let refused = CoreError::from(hassdeck_api::Error::WebSocketConnect("refused".into()));
        assert!(refused.is_transient());
    }

    #[test]
    fn tls_failure_is_a_config_error() {
        let err = CoreError::from(hassdeck_api::Error::Tls("no provider".into()));
        assert!(matches!(err, CoreError::Config { .. }));
        assert_eq!(err.to_string(), "Configuration error: TLS setup failed: no provider");
    }
}
