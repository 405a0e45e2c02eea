use super::*;

fn handshake() -> Handshake {
    Handshake {
        sid: "eio-1".to_owned(),
        upgrades: Vec::new(),
        ping_interval: 25_000,
        ping_timeout: 20_000,
        max_payload: Some(1_000_000),
    }
}

#[test]
fn encode_heartbeat_packets() {
    assert_eq!(encode_packet(&EnginePacket::Ping), "2");
    assert_eq!(encode_packet(&EnginePacket::Pong), "3");
    assert_eq!(encode_packet(&EnginePacket::Close), "1");
}

#[test]
fn encode_connect_without_auth_is_bare() {
    assert_eq!(encode_packet(&EnginePacket::connect(None)), "40");
}

#[test]
fn encode_connect_carries_auth_token() {
    let packet = EnginePacket::connect(Some(serde_json::json!({ "token": "t-1" })));
    assert_eq!(encode_packet(&packet), r#"40{"token":"t-1"}"#);
}

#[test]
fn encode_event_wraps_name_and_argument_in_array() {
    let packet = EnginePacket::event("join-tracking", serde_json::json!("P1"));
    assert_eq!(encode_packet(&packet), r#"42["join-tracking","P1"]"#);
}

#[test]
fn decode_open_reads_heartbeat_parameters() {
    let text = r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
    let packet = decode_packet(text).expect("open");
    assert_eq!(packet, EnginePacket::Open(handshake()));
}

#[test]
fn encoded_open_is_readable_by_decoder() {
    let text = encode_packet(&EnginePacket::Open(handshake()));
    assert!(text.starts_with("0{"));
    assert_eq!(decode_packet(&text).expect("open"), EnginePacket::Open(handshake()));
}

#[test]
fn decode_connect_ack_keeps_sid_payload() {
    let packet = decode_packet(r#"40{"sid":"sock-9"}"#).expect("connect");
    assert_eq!(
        packet,
        EnginePacket::Message(SocketPacket::Connect(Some(serde_json::json!({ "sid": "sock-9" }))))
    );
}

#[test]
fn decode_event_extracts_name_and_first_argument() {
    let packet = decode_packet(r#"42["status-changed",{"parcelId":"P1","status":"delivered"}]"#).expect("event");
    let EnginePacket::Message(SocketPacket::Event { name, data }) = packet else {
        panic!("expected event packet");
    };
    assert_eq!(name, "status-changed");
    assert_eq!(data["parcelId"], "P1");
}

#[test]
fn decode_event_without_argument_defaults_to_null() {
    let packet = decode_packet(r#"42["ping-me"]"#).expect("event");
    assert_eq!(packet, EnginePacket::event("ping-me", serde_json::Value::Null));
}

#[test]
fn decode_event_skips_ack_id_and_root_namespace() {
    let packet = decode_packet(r#"42/,17["system-announcement","hello"]"#).expect("event");
    assert_eq!(packet, EnginePacket::event("system-announcement", serde_json::json!("hello")));
}

#[test]
fn decode_rejects_foreign_namespace() {
    let err = decode_packet(r#"42/admin,["x",1]"#).expect_err("namespace");
    assert!(matches!(err, CodecError::ForeignNamespace(ns) if ns == "/admin"));
}

#[test]
fn decode_connect_error_keeps_message() {
    let packet = decode_packet(r#"44{"message":"invalid token"}"#).expect("connect error");
    assert_eq!(
        packet,
        EnginePacket::Message(SocketPacket::ConnectError(serde_json::json!({ "message": "invalid token" })))
    );
}

#[test]
fn decode_server_disconnect() {
    assert_eq!(decode_packet("41").expect("disconnect"), EnginePacket::Message(SocketPacket::Disconnect));
}

#[test]
fn decode_rejects_empty_frame() {
    assert!(matches!(decode_packet(""), Err(CodecError::Empty)));
    assert!(matches!(decode_packet("4"), Err(CodecError::Empty)));
}

#[test]
fn decode_rejects_unknown_types() {
    assert!(matches!(decode_packet("9"), Err(CodecError::UnknownEngineType('9'))));
    assert!(matches!(decode_packet("49"), Err(CodecError::UnknownSocketType('9'))));
}

#[test]
fn decode_rejects_binary_and_ack_packets() {
    assert!(matches!(decode_packet(r#"431["ok"]"#), Err(CodecError::Unsupported('3'))));
    assert!(matches!(decode_packet(r#"451-["file",{}]"#), Err(CodecError::Unsupported('5'))));
}

#[test]
fn decode_rejects_event_without_string_name() {
    assert!(matches!(decode_packet("42[]"), Err(CodecError::MalformedEvent)));
    assert!(matches!(decode_packet("42[1,2]"), Err(CodecError::MalformedEvent)));
    assert!(matches!(decode_packet(r#"42{"a":1}"#), Err(CodecError::MalformedEvent)));
}

#[test]
fn decode_rejects_malformed_json() {
    assert!(matches!(decode_packet("42[\"x\","), Err(CodecError::Json(_))));
}

#[test]
fn decode_ping_with_probe_payload_is_ping() {
    assert_eq!(decode_packet("2probe").expect("ping"), EnginePacket::Ping);
}
