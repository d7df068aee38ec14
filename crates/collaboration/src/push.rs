/// WebSocket subscription to the store's push channel
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::{CollaborationError, PushMessage, Result};

/// Live push-channel connection. Messages are queued in arrival order; the
/// reader task stops when the socket closes or the subscriber is dropped.
pub struct PushSubscriber {
    rx: mpsc::UnboundedReceiver<PushMessage>,
    reader: JoinHandle<()>,
}

impl PushSubscriber {
    pub async fn connect(url: &str) -> Result<Self> {
        let (mut stream, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            match e {
                tokio_tungstenite::tungstenite::Error::Http(ref resp)
                    if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 =>
                {
                    CollaborationError::Unauthorized
                }
                other => CollaborationError::NetworkError(other.to_string()),
            }
        })?;
        info!("push channel connected");

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(e) => {
                        error!("push channel error: {}", e);
                        break;
                    }
                };

                match msg {
                    Message::Text(text) => match serde_json::from_str::<PushMessage>(&text) {
                        Ok(push) => {
                            if tx.send(push).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("ignoring unknown push message {:?}: {}", text, e),
                    },
                    Message::Close(_) => {
                        debug!("push channel closed by server");
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(Self { rx, reader })
    }

    /// Next message, or `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<PushMessage> {
        self.rx.recv().await
    }
}

impl Drop for PushSubscriber {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
