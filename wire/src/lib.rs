//! Shared packet model and text codec for the realtime tracking channel.
//!
//! This crate owns the wire representation spoken with the courier backend:
//! Engine.IO v4 transport packets carrying Socket.IO v5 packets on the
//! default namespace. Event payloads stay flexible (`serde_json::Value`) at
//! this layer; the typed shapes live in [`events`].

pub mod events;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error returned by [`decode_packet`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text frame was empty.
    #[error("empty packet")]
    Empty,
    /// The leading Engine.IO type character is not a known packet type.
    #[error("unknown engine packet type: {0:?}")]
    UnknownEngineType(char),
    /// The Socket.IO type character is not a known packet type.
    #[error("unknown socket packet type: {0:?}")]
    UnknownSocketType(char),
    /// Binary attachments and acknowledgements are not used by this client.
    #[error("unsupported socket packet type: {0:?}")]
    Unsupported(char),
    /// The packet addresses a namespace other than `/`.
    #[error("packet for foreign namespace {0}")]
    ForeignNamespace(String),
    /// The JSON body of the packet could not be parsed.
    #[error("invalid packet json: {0}")]
    Json(#[from] serde_json::Error),
    /// An event packet body was not an array starting with the event name.
    #[error("event packet must be an array starting with a string name")]
    MalformedEvent,
}

/// Session parameters sent by the server in the Engine.IO OPEN packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the connection may upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Interval between server pings, in milliseconds.
    pub ping_interval: u64,
    /// Grace period after a missed ping, in milliseconds.
    pub ping_timeout: u64,
    /// Maximum payload size accepted by the server, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// Transport-level packet.
#[derive(Clone, Debug, PartialEq)]
pub enum EnginePacket {
    /// Session opened; carries heartbeat parameters.
    Open(Handshake),
    /// Transport is closing.
    Close,
    /// Heartbeat probe, sent by the server.
    Ping,
    /// Heartbeat reply.
    Pong,
    /// Application packet.
    Message(SocketPacket),
    /// Transport upgrade marker (unused over websocket).
    Upgrade,
    /// No-op filler packet.
    Noop,
}

/// Namespace-level packet carried inside [`EnginePacket::Message`].
#[derive(Clone, Debug, PartialEq)]
pub enum SocketPacket {
    /// Client: connect request with optional auth. Server: accept with `{sid}`.
    Connect(Option<Value>),
    /// Namespace disconnect.
    Disconnect,
    /// Named event with a single argument.
    Event {
        /// Event name, e.g. `"location-updated"`.
        name: String,
        /// First event argument, or `null` when the event carried none.
        data: Value,
    },
    /// Server refused the namespace connection.
    ConnectError(Value),
}

impl EnginePacket {
    /// Build an event message packet.
    #[must_use]
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Self::Message(SocketPacket::Event {
            name: name.into(),
            data,
        })
    }

    /// Build a namespace connect packet with optional auth payload.
    #[must_use]
    pub fn connect(auth: Option<Value>) -> Self {
        Self::Message(SocketPacket::Connect(auth))
    }
}

/// Encode a packet into its text frame.
#[must_use]
pub fn encode_packet(packet: &EnginePacket) -> String {
    match packet {
        EnginePacket::Open(handshake) => {
            // Serializing a plain struct of strings and integers cannot fail.
            let body = serde_json::to_string(handshake).unwrap_or_default();
            format!("0{body}")
        }
        EnginePacket::Close => "1".to_owned(),
        EnginePacket::Ping => "2".to_owned(),
        EnginePacket::Pong => "3".to_owned(),
        EnginePacket::Message(socket) => format!("4{}", encode_socket_packet(socket)),
        EnginePacket::Upgrade => "5".to_owned(),
        EnginePacket::Noop => "6".to_owned(),
    }
}

/// Decode a text frame into a packet.
///
/// # Errors
///
/// Returns [`CodecError`] for empty frames, unknown or unsupported packet
/// types, packets for other namespaces, and malformed JSON bodies.
pub fn decode_packet(text: &str) -> Result<EnginePacket, CodecError> {
    let mut chars = text.chars();
    let Some(kind) = chars.next() else {
        return Err(CodecError::Empty);
    };
    let rest = chars.as_str();

    match kind {
        '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => decode_socket_packet(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(CodecError::UnknownEngineType(other)),
    }
}

fn encode_socket_packet(packet: &SocketPacket) -> String {
    match packet {
        SocketPacket::Connect(None) => "0".to_owned(),
        SocketPacket::Connect(Some(auth)) => format!("0{auth}"),
        SocketPacket::Disconnect => "1".to_owned(),
        SocketPacket::Event { name, data } => {
            let args = Value::Array(vec![Value::String(name.clone()), data.clone()]);
            format!("2{args}")
        }
        SocketPacket::ConnectError(body) => format!("4{body}"),
    }
}

fn decode_socket_packet(text: &str) -> Result<SocketPacket, CodecError> {
    let mut chars = text.chars();
    let Some(kind) = chars.next() else {
        return Err(CodecError::Empty);
    };
    let body = strip_ack_id(strip_namespace(chars.as_str())?);

    match kind {
        '0' if body.is_empty() => Ok(SocketPacket::Connect(None)),
        '0' => Ok(SocketPacket::Connect(Some(serde_json::from_str(body)?))),
        '1' => Ok(SocketPacket::Disconnect),
        '2' => decode_event(body),
        '4' if body.is_empty() => Ok(SocketPacket::ConnectError(Value::Null)),
        '4' => Ok(SocketPacket::ConnectError(serde_json::from_str(body)?)),
        '3' | '5' | '6' => Err(CodecError::Unsupported(kind)),
        other => Err(CodecError::UnknownSocketType(other)),
    }
}

fn decode_event(body: &str) -> Result<SocketPacket, CodecError> {
    let Value::Array(mut args) = serde_json::from_str::<Value>(body)? else {
        return Err(CodecError::MalformedEvent);
    };
    if args.is_empty() {
        return Err(CodecError::MalformedEvent);
    }
    let Value::String(name) = args.remove(0) else {
        return Err(CodecError::MalformedEvent);
    };
    let data = if args.is_empty() {
        Value::Null
    } else {
        args.swap_remove(0)
    };
    Ok(SocketPacket::Event { name, data })
}

/// Drop an explicit namespace prefix, rejecting anything but `/`.
fn strip_namespace(text: &str) -> Result<&str, CodecError> {
    if !text.starts_with('/') {
        return Ok(text);
    }
    let (namespace, rest) = text.split_once(',').unwrap_or((text, ""));
    if namespace == "/" {
        Ok(rest)
    } else {
        Err(CodecError::ForeignNamespace(namespace.to_owned()))
    }
}

/// Skip an acknowledgement id; acks are never requested by this client.
fn strip_ack_id(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
