//! End-to-end client tests against a loopback server.

use bytes::BytesMut;
use chrono::{TimeZone, Utc};
use statlink_session::{Client, ClientConfig, ClientEvent, ConnectionState, SessionError};
use statlink_wire::{
    encode_response, get_text, FrameBuilder, Header, MessageType, ProtocolError, Response,
    ServerTime, StatsRecord, StatusCode, DEFAULT_MAGIC, HEADER_SIZE,
};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

/// Accept one connection on a fresh port and hand it to `handler`
async fn serve<F, Fut>(handler: F) -> u16
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        handler(socket).await;
    });
    port
}

async fn read_request(socket: &mut TcpStream) -> (Header, Vec<u8>) {
    let mut header = [0u8; HEADER_SIZE];
    socket.read_exact(&mut header).await.unwrap();
    let header = Header::peek(&header).unwrap();

    let mut payload = vec![0u8; header.payload_len as usize];
    socket.read_exact(&mut payload).await.unwrap();
    (header, payload)
}

/// Park until the client closes its side
async fn wait_for_close(socket: &mut TcpStream) {
    let mut buf = [0u8; 64];
    while let Ok(n) = socket.read(&mut buf).await {
        if n == 0 {
            break;
        }
    }
}

async fn next_event(events: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn connected(port: u16, config: ClientConfig) -> (Client, mpsc::Receiver<ClientEvent>) {
    let (mut client, mut events) = Client::new(config);
    client.connect("127.0.0.1", port).unwrap();

    match next_event(&mut events).await {
        ClientEvent::ConnectionEstablished { peer } => assert_eq!(peer.port(), port),
        other => panic!("expected connection, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Connected);
    (client, events)
}

fn sample_stats() -> StatsRecord {
    StatsRecord {
        bytes_received: 1000,
        bytes_sent: 2000,
        packets_received: 10,
        packets_sent: 20,
        uptime_secs: 3600,
        clients: 5,
    }
}

#[tokio::test]
async fn test_stats_request() {
    let port = serve(|mut socket| async move {
        let (header, payload) = read_request(&mut socket).await;
        assert_eq!(header.magic, DEFAULT_MAGIC);
        assert_eq!(header.message_type, MessageType::GetStats);
        assert_eq!(header.payload_len, 0);
        assert!(payload.is_empty());

        let reply =
            encode_response(DEFAULT_MAGIC, &Response::Stats(sample_stats()), StatusCode::Success)
                .unwrap();
        socket.write_all(&reply).await.unwrap();
        wait_for_close(&mut socket).await;
    })
    .await;

    let (client, mut events) = connected(port, ClientConfig::default()).await;
    client.send_request(MessageType::GetStats).unwrap();

    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::StatsReceived(sample_stats())
    );
}

#[tokio::test]
async fn test_set_data_reply() {
    let port = serve(|mut socket| async move {
        let (header, payload) = read_request(&mut socket).await;
        assert_eq!(header.message_type, MessageType::SetData);

        let mut slice = &payload[..];
        let text = get_text(&mut slice).unwrap();
        assert!(slice.is_empty());

        let reply = Response::Reply {
            message_type: MessageType::SetData,
            text: format!("stored: {}", text),
        };
        let bytes = encode_response(DEFAULT_MAGIC, &reply, StatusCode::Success).unwrap();
        socket.write_all(&bytes).await.unwrap();
        wait_for_close(&mut socket).await;
    })
    .await;

    let (client, mut events) = connected(port, ClientConfig::default()).await;
    client.send_data(MessageType::SetData, "привет").unwrap();

    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::ReplyReceived {
            message_type: MessageType::SetData,
            text: "stored: привет".to_string()
        }
    );
}

#[tokio::test]
async fn test_fragmented_and_corrupted_stream() {
    let time = ServerTime::from_utc(Utc.timestamp_opt(1_700_000_000, 0).unwrap());

    let server_time = time.clone();
    let port = serve(|mut socket| async move {
        let mut stream = BytesMut::new();
        stream.extend_from_slice(&[0x01, 0x02, 0x03, 0xA5, 0x04]);
        stream.extend_from_slice(
            &encode_response(DEFAULT_MAGIC, &Response::Time(server_time), StatusCode::Success)
                .unwrap(),
        );
        stream.extend_from_slice(
            &FrameBuilder::new(Header::request(MessageType::Unknown(99)))
                .raw(&[1, 2, 3, 4])
                .build()
                .unwrap(),
        );
        stream.extend_from_slice(
            &encode_response(DEFAULT_MAGIC, &Response::FreeSpace(4096), StatusCode::Success)
                .unwrap(),
        );

        for chunk in stream.chunks(3) {
            socket.write_all(chunk).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        wait_for_close(&mut socket).await;
    })
    .await;

    let (_client, mut events) = connected(port, ClientConfig::default()).await;

    assert_eq!(next_event(&mut events).await, ClientEvent::TimeReceived(time));
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::ProtocolError(ProtocolError::UnknownMessageType(99))
    );
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::FreeSpaceReceived(4096)
    );
}

#[tokio::test]
async fn test_error_status_still_dispatched() {
    let port = serve(|mut socket| async move {
        let _ = read_request(&mut socket).await;
        let reply = Response::Reply {
            message_type: MessageType::SetData,
            text: "no room".to_string(),
        };
        let bytes = encode_response(DEFAULT_MAGIC, &reply, StatusCode::NoFreeSpace).unwrap();
        socket.write_all(&bytes).await.unwrap();
        wait_for_close(&mut socket).await;
    })
    .await;

    let (client, mut events) = connected(port, ClientConfig::default()).await;
    client.send_data(MessageType::SetData, "big").unwrap();

    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::ErrorStatus {
            message_type: MessageType::SetData,
            status: StatusCode::NoFreeSpace
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::ReplyReceived {
            message_type: MessageType::SetData,
            text: "no room".to_string()
        }
    );
}

#[tokio::test]
async fn test_custom_magic() {
    let port = serve(|mut socket| async move {
        let (header, _) = read_request(&mut socket).await;
        assert_eq!(header.magic, 0xBEEF);
        assert_eq!(header.message_type, MessageType::GetFreeSpace);

        let bytes =
            encode_response(0xBEEF, &Response::FreeSpace(77), StatusCode::Success).unwrap();
        socket.write_all(&bytes).await.unwrap();
        wait_for_close(&mut socket).await;
    })
    .await;

    let config = ClientConfig {
        magic: 0xBEEF,
        ..ClientConfig::default()
    };
    let (client, mut events) = connected(port, config).await;
    client.send_request(MessageType::GetFreeSpace).unwrap();

    assert_eq!(next_event(&mut events).await, ClientEvent::FreeSpaceReceived(77));
}

#[tokio::test]
async fn test_connection_failed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (mut client, mut events) = Client::new(ClientConfig::default());
    client.connect("127.0.0.1", port).unwrap();

    match next_event(&mut events).await {
        ClientEvent::ConnectionFailed { code, reason } => {
            assert_eq!(code, StatusCode::ConnectToHost);
            assert!(!reason.is_empty());
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Idle);
    assert!(matches!(
        client.send_request(MessageType::GetTime),
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn test_peer_close() {
    let port = serve(|socket| async move {
        drop(socket);
    })
    .await;

    let (client, mut events) = connected(port, ClientConfig::default()).await;

    assert_eq!(next_event(&mut events).await, ClientEvent::Disconnected);
    assert_eq!(client.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_client_disconnect_and_reconnect() {
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
    let port = serve(|mut socket| async move {
        wait_for_close(&mut socket).await;
        let _ = closed_tx.send(());
    })
    .await;

    let (mut client, mut events) = connected(port, ClientConfig::default()).await;
    client.disconnect();

    assert_eq!(next_event(&mut events).await, ClientEvent::Disconnected);
    assert_eq!(client.state(), ConnectionState::Idle);
    tokio::time::timeout(WAIT, closed_rx).await.unwrap().unwrap();

    // Idle again, so a new attempt is accepted
    let port = serve(|mut socket| async move {
        wait_for_close(&mut socket).await;
    })
    .await;
    client.connect("127.0.0.1", port).unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::ConnectionEstablished { .. }
    ));
}

#[tokio::test]
async fn test_disconnect_while_connecting_is_ignored() {
    let port = serve(|mut socket| async move {
        wait_for_close(&mut socket).await;
    })
    .await;

    let (mut client, mut events) = Client::new(ClientConfig::default());
    let mut states = client.subscribe_state();
    client.connect("127.0.0.1", port).unwrap();
    assert_eq!(*states.borrow_and_update(), ConnectionState::Connecting);

    // Not connected yet, so the attempt carries on
    client.disconnect();
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::ConnectionEstablished { .. }
    ));
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);

    client.disconnect();
    assert_eq!(next_event(&mut events).await, ClientEvent::Disconnected);
    assert_eq!(*states.borrow(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_incomplete_payload_times_out() {
    let port = serve(|mut socket| async move {
        let mut header = Header::request(MessageType::GetStats);
        header.payload_len = 24;
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        buf.extend_from_slice(&[0, 0, 0, 1]);

        socket.write_all(&buf).await.unwrap();
        wait_for_close(&mut socket).await;
    })
    .await;

    let config = ClientConfig {
        payload_timeout: Some(Duration::from_millis(100)),
        ..ClientConfig::default()
    };
    let (client, mut events) = connected(port, config).await;

    assert_eq!(next_event(&mut events).await, ClientEvent::Disconnected);
    assert_eq!(client.state(), ConnectionState::Idle);
}
