use fzm_connection::TransportError;
use fzm_gateway::GatewayError;

/// Errors surfaced by [`crate::ZoneClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The push socket failed; the run is over.
    #[error("connection lost: {0}")]
    Connection(#[from] TransportError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A call was attempted before the service handed out a visit secret.
    #[error("not connected yet: no visit secret received")]
    NotConnected,
}

impl ClientError {
    /// Text suitable for an alert.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Gateway(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
