use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use warp::ws::{Message, WebSocket};

use crate::controller::{RecorderSnapshot, RecordingController};

/// Pushes a recorder snapshot whenever it changes: on every status
/// transition, on each timer tick while recording and when Drive
/// connectivity flips.
pub async fn stream_snapshots(websocket: WebSocket, controller: Arc<RecordingController>) {
    tracing::info!("Recorder event stream opened");

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let mut observer = controller.observer();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last_sent: Option<RecorderSnapshot> = None;

    loop {
        let snapshot = controller.snapshot().await;
        if last_sent.as_ref() != Some(&snapshot) {
            let text = match serde_json::to_string(&snapshot) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode recorder snapshot");
                    break;
                }
            };
            if let Err(e) = ws_sender.send(Message::text(text)).await {
                tracing::debug!(error = %e, "Recorder event stream send failed");
                break;
            }
            last_sent = Some(snapshot);
        }

        tokio::select! {
            changed = observer.changed() => {
                if changed.is_none() {
                    break;
                }
            }
            _ = ticker.tick() => {}
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(message)) if !message.is_close() => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Recorder event stream error");
                    break;
                }
                _ => break,
            },
        }
    }

    tracing::info!("Recorder event stream closed");
}
