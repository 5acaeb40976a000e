//! WebSocket write pump: serialises outbound frames.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Forwards queued frames to the socket sink until cancelled.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        let closing = matches!(m, tungstenite::Message::Close(_));
                        if let Err(e) = write.send(m).await {
                            error!("WebSocket write error: {e}");
                            return;
                        }
                        if closing {
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    fn recording_sink(
        tx: mpsc::Sender<tungstenite::Message>,
    ) -> impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    #[tokio::test]
    async fn write_pump_stops_on_cancel() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let cancel = CancellationToken::new();

        let (_write_tx, write_rx) = mpsc::channel(16);
        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            write_pump(recording_sink(sink_tx), write_rx, c).await;
        });

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        let close_msg = sink_rx.recv().await;
        assert!(matches!(close_msg, Some(tungstenite::Message::Close(_))));
    }

    #[tokio::test]
    async fn write_pump_forwards_in_order_and_stops_after_close() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let (write_tx, write_rx) = mpsc::channel(16);
        let handle = tokio::spawn(write_pump(
            recording_sink(sink_tx),
            write_rx,
            CancellationToken::new(),
        ));

        write_tx
            .send(tungstenite::Message::Ping(Vec::new().into()))
            .await
            .unwrap();
        write_tx
            .send(tungstenite::Message::Pong(Vec::new().into()))
            .await
            .unwrap();
        write_tx.send(tungstenite::Message::Close(None)).await.unwrap();
        handle.await.unwrap();

        assert!(matches!(sink_rx.recv().await, Some(tungstenite::Message::Ping(_))));
        assert!(matches!(sink_rx.recv().await, Some(tungstenite::Message::Pong(_))));
        assert!(matches!(sink_rx.recv().await, Some(tungstenite::Message::Close(_))));
        assert!(sink_rx.recv().await.is_none());
    }
}
