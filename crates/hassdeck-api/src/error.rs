use thiserror::Error;

/// Top-level error type for the `hassdeck-api` crate.
///
/// Covers transport setup, the authentication handshake, and framing.
/// `hassdeck-core` maps these into its own error type; none of them are
/// fatal to the connection manager, which logs and retries.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The hub answered the handshake with `auth_nok` / `auth_invalid`.
    #[error("Authentication rejected by hub: {message}")]
    AuthRejected { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Endpoint URL could not be built from host and port.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration could not be assembled.
    #[error("TLS error: {0}")]
    Tls(String),

    /// WebSocket dial or read failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The hub sent a close frame.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The socket is not open (never dialed, or already torn down).
    #[error("Channel is not connected")]
    NotConnected,

    // ── Data ────────────────────────────────────────────────────────
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if reconnecting might resolve the error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } | Self::NotConnected
        )
    }

    /// Returns `true` if the hub refused the access token.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}
