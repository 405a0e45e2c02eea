use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use wire::SocketPacket;

use super::*;

#[test]
fn websocket_url_maps_http_schemes() {
    assert_eq!(
        websocket_url("http://localhost:5000").expect("url"),
        "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
    );
    assert_eq!(
        websocket_url("https://courier.example/").expect("url"),
        "wss://courier.example/socket.io/?EIO=4&transport=websocket"
    );
    assert_eq!(
        websocket_url("ws://10.0.0.2:9000").expect("url"),
        "ws://10.0.0.2:9000/socket.io/?EIO=4&transport=websocket"
    );
}

#[test]
fn websocket_url_rejects_unknown_scheme() {
    let err = websocket_url("ftp://courier.example").expect_err("bad scheme");
    assert!(matches!(err, ConnectionError::InvalidUrl(_)));
}

#[tokio::test]
async fn websocket_connector_pumps_text_frames_both_ways() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
        ws.send(Message::Text(
            r#"0{"sid":"e1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#.into(),
        ))
        .await
        .expect("send open");
        let frame = ws.next().await.expect("frame").expect("ok frame");
        ws.close(None).await.expect("close");
        frame.into_text().expect("text").as_str().to_owned()
    });

    let url = websocket_url(&format!("http://{addr}")).expect("url");
    let mut link = WebSocketConnector.connect(&url).await.expect("connect");

    let open = link.recv().await.expect("open packet");
    let EnginePacket::Open(handshake) = open else {
        panic!("expected open, got {open:?}");
    };
    assert_eq!(handshake.sid, "e1");
    assert_eq!(handshake.ping_interval, 25_000);

    link.send(&EnginePacket::connect(None)).expect("send connect");
    let received = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server finished")
        .expect("server task");
    assert_eq!(received, "40");

    let closed = tokio::time::timeout(Duration::from_secs(5), link.recv())
        .await
        .expect("close observed");
    assert!(matches!(closed, Err(ConnectionError::Closed)));
}

#[tokio::test]
async fn recv_reports_codec_errors() {
    let (outgoing, _keep) = tokio::sync::mpsc::unbounded_channel();
    let (incoming_tx, incoming) = tokio::sync::mpsc::unbounded_channel();
    let mut link = TransportLink { outgoing, incoming };

    incoming_tx.send("9".to_owned()).expect("queue");
    incoming_tx.send(r#"42["status-changed",{}]"#.to_owned()).expect("queue");

    assert!(matches!(link.recv().await, Err(ConnectionError::Codec(_))));
    let packet = link.recv().await.expect("event");
    assert!(matches!(packet, EnginePacket::Message(SocketPacket::Event { .. })));
}
