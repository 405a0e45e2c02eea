//! Text-frame transports for the realtime connection.
//!
//! DESIGN
//! ======
//! A [`Connector`] opens one transport and hands back a [`TransportLink`]: a
//! pair of channels carrying raw text frames. The websocket implementation
//! pumps those channels from two spawned tasks; tests plug in an in-memory
//! connector instead. The link closing (incoming side yielding `None`) is the
//! only disconnect signal the connection driver needs.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use wire::{EnginePacket, decode_packet, encode_packet};

use super::connection::ConnectionError;

const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// One open transport, as a pair of text-frame channels.
pub struct TransportLink {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

impl TransportLink {
    /// Encode and queue a packet for the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the transport is gone.
    pub fn send(&self, packet: &EnginePacket) -> Result<(), ConnectionError> {
        self.outgoing
            .send(encode_packet(packet))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Wait for and decode the next packet.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] when the transport ends and
    /// [`ConnectionError::Codec`] for undecodable frames.
    pub async fn recv(&mut self) -> Result<EnginePacket, ConnectionError> {
        let text = self.incoming.recv().await.ok_or(ConnectionError::Closed)?;
        Ok(decode_packet(&text)?)
    }
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `url`.
    async fn connect(&self, url: &str) -> Result<TransportLink, ConnectionError>;
}

/// Websocket transport over `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink, ConnectionError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| ConnectionError::WsConnect(Box::new(e)))?;
        let (mut sink, mut source) = stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (incoming_tx, incoming) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::debug!(error = %e, "websocket send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if incoming_tx.send(text.as_str().to_owned()).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "websocket receive failed");
                        break;
                    }
                }
            }
        });

        Ok(TransportLink { outgoing, incoming })
    }
}

/// Websocket endpoint for a realtime origin such as `http://localhost:5000`.
///
/// # Errors
///
/// Returns [`ConnectionError::InvalidUrl`] for schemes other than
/// `http(s)`/`ws(s)`.
pub fn websocket_url(socket_url: &str) -> Result<String, ConnectionError> {
    let trimmed = socket_url.trim_end_matches('/');

    if let Some(rest) = trimmed.strip_prefix("http://") {
        return Ok(format!("ws://{rest}{SOCKET_IO_PATH}"));
    }
    if let Some(rest) = trimmed.strip_prefix("https://") {
        return Ok(format!("wss://{rest}{SOCKET_IO_PATH}"));
    }
    if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        return Ok(format!("{trimmed}{SOCKET_IO_PATH}"));
    }

    Err(ConnectionError::InvalidUrl(socket_url.to_owned()))
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
