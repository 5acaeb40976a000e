//! Keepalive for the push socket.
//!
//! The service only pushes when something changes, so a quiet socket is
//! normal. Each ping must be answered within [`WS_PONG_TIMEOUT`]; a missed
//! pong trips `pong_missed`, which makes the read pump end the run with
//! `Timeout` without waiting for the full read deadline.

use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use fzm_protocol::constants::{WS_PING_PERIOD, WS_PONG_TIMEOUT};

/// Pings every [`WS_PING_PERIOD`] and waits for the read pump to report a
/// pong on `pongs`. Stops on cancel, when the writer goes away, or after
/// tripping `pong_missed`.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    mut pongs: watch::Receiver<()>,
    pong_missed: CancellationToken,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(WS_PING_PERIOD);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        pongs.borrow_and_update();
        let ping = tungstenite::Message::Ping(Vec::new().into());
        if write_tx.send(ping).await.is_err() {
            return;
        }
        trace!("ping sent");

        tokio::select! {
            _ = cancel.cancelled() => return,
            answered = tokio::time::timeout(WS_PONG_TIMEOUT, pongs.changed()) => match answered {
                Ok(Ok(())) => trace!("pong in time"),
                // Read pump finished; it has already reported the outcome.
                Ok(Err(_)) => return,
                Err(_) => {
                    warn!("no pong within {WS_PONG_TIMEOUT:?}, connection dead");
                    pong_missed.cancel();
                    return;
                }
            },
        }
    }
}
