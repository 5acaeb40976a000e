//! WebSocket read pump: decodes push events in arrival order.

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use fzm_protocol::ServerEvent;
use fzm_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_READ_DEADLINE};

use crate::ws_client::TransportError;

type EventSender = mpsc::Sender<Result<ServerEvent, TransportError>>;

/// Reads frames from the socket and forwards decoded events.
///
/// Any incoming frame resets the read deadline. If nothing arrives within
/// [`WS_READ_DEADLINE`] the connection is considered dead, and so it is once
/// the ping pump trips `pong_missed`. Pongs are reported on `pongs`. Every
/// exit other than cancellation or a vanished consumer pushes a terminal
/// `Err` first.
pub(crate) async fn read_pump<S>(
    mut read: S,
    events_tx: EventSender,
    write_tx: mpsc::Sender<tungstenite::Message>,
    pongs: watch::Sender<()>,
    pong_missed: CancellationToken,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(WS_READ_DEADLINE);
    tokio::pin!(deadline);

    let failure = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            () = &mut deadline => {
                warn!("no traffic within {WS_READ_DEADLINE:?}, connection dead");
                break TransportError::Timeout;
            }

            _ = pong_missed.cancelled() => break TransportError::Timeout,

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + WS_READ_DEADLINE);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                let Some(event) = decode_text(&text) else { continue };
                                if events_tx.send(Ok(event)).await.is_err() {
                                    debug!("event consumer gone, stopping read pump");
                                    return;
                                }
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                                pongs.send_replace(());
                            }
                            tungstenite::Message::Close(frame) => {
                                debug!(?frame, "received close frame");
                                break TransportError::Closed;
                            }
                            _ => {} // Binary frames are not used.
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break TransportError::Ws(e);
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break TransportError::Closed;
                    }
                }
            }
        }
    };

    let _ = events_tx.send(Err(failure)).await;
}

/// Decodes one text frame. Oversized or malformed frames are dropped.
fn decode_text(text: &str) -> Option<ServerEvent> {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return None;
    }

    match ServerEvent::parse(text) {
        Ok(event) => {
            trace!(kind = event.kind(), "received event");
            Some(event)
        }
        Err(e) => {
            warn!("failed to parse event: {e}");
            None
        }
    }
}
