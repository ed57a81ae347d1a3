// ── Core error types ──
//
// User-facing errors from silowatch-core. Consumers never see HTTP status
// codes or JSON parse failures directly; the `From<silowatch_api::Error>`
// impl translates transport-layer errors into domain variants.

use thiserror::Error;

/// Fallback shown when the alert baseline cannot be loaded.
pub const ALERT_FETCH_FALLBACK: &str = "Unable to load critical alerts";

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("No active device selected")]
    NoActiveDevice,

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Not found: {identifier}")]
    NotFound { identifier: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        code: Option<String>,
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Short message suitable for inline feedback next to an alert.
    ///
    /// Server-provided messages pass through; transport noise is replaced
    /// by `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::NoActiveDevice => "No device selected".into(),
            Self::AuthenticationFailed { .. } => "Not authorized".into(),
            Self::NotFound { .. } => "Alert no longer exists".into(),
            Self::Api { message, .. } if !message.is_empty() => message.clone(),
            _ => fallback.to_owned(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<silowatch_api::Error> for CoreError {
    fn from(err: silowatch_api::Error) -> Self {
        use silowatch_api::Error as ApiError;

        match err {
            ApiError::Authentication { message } => CoreError::AuthenticationFailed { message },
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::InvalidBaseUrl(url) => CoreError::Config {
                message: format!("Base URL cannot hold API paths: {url}"),
            },
            ApiError::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ApiError::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            ApiError::Api {
                status: 404,
                message,
                ..
            } => CoreError::NotFound {
                identifier: message,
            },
            ApiError::Api {
                status,
                message,
                code,
            } => CoreError::Api {
                message,
                code,
                status: Some(status),
            },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            ApiError::StreamConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("Stream connection failed: {reason}"),
            },
            ApiError::StreamClosed { reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("Stream closed: {reason}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_404_becomes_not_found() {
        let err: CoreError = silowatch_api::Error::Api {
            status: 404,
            message: "alert a1".into(),
            code: None,
        }
        .into();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert_eq!(err.user_message(ALERT_FETCH_FALLBACK), "Alert no longer exists");
    }

    #[test]
    fn server_message_passes_through() {
        let err: CoreError = silowatch_api::Error::Api {
            status: 409,
            message: "Alert already resolved".into(),
            code: Some("conflict".into()),
        }
        .into();
        assert_eq!(err.user_message("fallback"), "Alert already resolved");
    }

    #[test]
    fn transport_noise_uses_fallback() {
        let err: CoreError = silowatch_api::Error::StreamConnect("refused".into()).into();
        assert_eq!(err.user_message(ALERT_FETCH_FALLBACK), ALERT_FETCH_FALLBACK);
    }
}
