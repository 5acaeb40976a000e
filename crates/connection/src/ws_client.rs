//! WebSocket client for the service push socket.
//!
//! Spawns read, write and ping pumps and exposes incoming events as an
//! `mpsc` stream. The socket is receive-only from the application's point
//! of view; outbound traffic is limited to pings, pongs and the close frame.

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fzm_protocol::ServerEvent;
use fzm_protocol::constants::WS_MAX_MESSAGE_SIZE;

/// Capacity of the event channel between the read pump and its consumer.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Errors from the transport connection. All of them end the run.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("connection timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,
}

/// Ordered stream of events. The last item of a failed connection is an
/// `Err`; after it the channel closes.
pub type EventStream = mpsc::Receiver<Result<ServerEvent, TransportError>>;

/// The single persistent connection of a run.
pub struct Transport {
    write_tx: mpsc::Sender<tungstenite::Message>,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl Transport {
    /// Opens the socket at `url` and starts the pumps.
    pub async fn connect(url: &str) -> Result<(Self, EventStream), TransportError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        info!(url, "socket connected");

        let (write, read) = ws_stream.split();
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(64);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let pong_missed = CancellationToken::new();
        let (pong_tx, pong_rx) = watch::channel(());

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let write_tx = write_tx.clone();
            let pong_missed = pong_missed.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read,
                events_tx,
                write_tx,
                pong_tx,
                pong_missed,
                cancel,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(
                write_tx,
                pong_rx,
                pong_missed,
                cancel,
            ))
        };

        let transport = Self {
            write_tx,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
            cancel,
        };
        Ok((transport, events_rx))
    }

    /// Gracefully closes the connection.
    pub async fn close(&self) {
        let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
        self.cancel.cancel();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::SinkExt;
    use tokio::net::TcpListener;

    #[test]
    fn transport_error_display() {
        assert_eq!(TransportError::Timeout.to_string(), "connection timed out");
        assert_eq!(TransportError::Closed.to_string(), "connection closed");
    }

    #[tokio::test]
    async fn connect_delivers_events_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            for frame in [
                r#"{"type":"visit","secret":"abc"}"#,
                r#"{"type":"log","num":1,"line":"one"}"#,
                r#"garbage"#,
                r#"{"type":"log","num":2,"line":"two"}"#,
            ] {
                ws.send(tungstenite::Message::Text(frame.into()))
                    .await
                    .unwrap();
            }
            ws.close(None).await.unwrap();
        });

        let (_transport, mut events) = Transport::connect(&format!("ws://{addr}/ws"))
            .await
            .unwrap();

        let first = events.recv().await.unwrap().unwrap();
        assert_eq!(first, ServerEvent::Visit { secret: "abc".into() });
        let second = events.recv().await.unwrap().unwrap();
        assert!(matches!(second, ServerEvent::Log { num: 1, .. }));
        // The malformed frame is dropped, not surfaced.
        let third = events.recv().await.unwrap().unwrap();
        assert!(matches!(third, ServerEvent::Log { num: 2, .. }));

        // Server close ends the run with an error.
        let last = events.recv().await.unwrap();
        assert!(matches!(last, Err(TransportError::Closed)));
        assert!(events.recv().await.is_none());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_to_dead_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = Transport::connect(&format!("ws://{addr}/ws")).await;
        assert!(matches!(result, Err(TransportError::Ws(_))));
    }
}
