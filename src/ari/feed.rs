use anyhow::{Context, Result};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::ari::events::AriEvent;

/// Persistent ARI event feed. One connection for the process lifetime;
/// a broken feed ends the dispatch loop (no reconnect, by design).
pub struct EventFeed {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl EventFeed {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _resp) = connect_async(url)
            .await
            .context("ARI event feed connect")?;
        info!("[ari feed] connected; waiting for calls...");
        Ok(Self { ws })
    }

    /// Next decodable event, or `None` when the feed closed. Frames that
    /// fail to decode are logged and skipped.
    pub async fn next_event(&mut self) -> Option<AriEvent> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(txt))) => {
                    match serde_json::from_str::<AriEvent>(txt.as_str()) {
                        Ok(ev) => {
                            debug!("[ari feed] event type={}", ev.kind);
                            return Some(ev);
                        }
                        Err(e) => {
                            warn!("[ari feed] undecodable event: {}", e);
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("[ari feed] feed closed");
                    return None;
                }
                Some(Ok(_)) => {
                    // ping/pong/binary: nothing to do
                }
                Some(Err(e)) => {
                    warn!("[ari feed] read error: {:?}", e);
                    return None;
                }
            }
        }
    }
}
