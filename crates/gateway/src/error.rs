//! Error types for gateway calls.

/// Errors produced by gateway calls.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("login rejected: {0}")]
    Auth(String),

    #[error("file is {size} bytes, the service accepts at most {limit} bytes")]
    SizeLimit { size: u64, limit: u64 },

    #[error("service error {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Text suitable for an alert: the service's own message for remote
    /// rejections, the display form otherwise.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Remote { body, .. } if !body.trim().is_empty() => body.trim().to_string(),
            GatewayError::Auth(body) if !body.trim().is_empty() => body.trim().to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_size_limit() {
        let e = GatewayError::SizeLimit {
            size: 10,
            limit: 5,
        };
        assert_eq!(
            e.to_string(),
            "file is 10 bytes, the service accepts at most 5 bytes"
        );
    }

    #[test]
    fn user_message_prefers_service_text() {
        let e = GatewayError::Remote {
            status: 400,
            body: " no instance running\n".into(),
        };
        assert_eq!(e.user_message(), "no instance running");

        let e = GatewayError::Remote {
            status: 502,
            body: String::new(),
        };
        assert_eq!(e.user_message(), "service error 502: ");
    }
}
