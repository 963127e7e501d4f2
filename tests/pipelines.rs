//! Read and write pipeline behavior over in-memory transports.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use common::{
    client_with, connection, fast_settings, wait_until, DuplexConnector, RecordingLifecycle,
    ServerSide,
};
use match_sync::client::ConnectionState;
use match_sync::core::message::Message;
use match_sync::error::ProtocolError;
use tokio::io::AsyncWriteExt;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handshake_is_the_first_packet() {
    let (connector, mut accepted) = DuplexConnector::new();
    let lifecycle = Arc::new(RecordingLifecycle::default());
    let client = client_with(connector, lifecycle.clone(), fast_settings());

    assert!(client.connect(connection()).unwrap());
    let (_server, handshake) = ServerSide::accept(&mut accepted).await;

    assert_eq!(
        handshake,
        Message::Connect {
            user_id: 7,
            match_id: "match-1".to_string(),
            match_token: "token-1".to_string(),
        }
    );
    assert!(wait_until(Duration::from_secs(1), || client.is_connected()).await);
    assert_eq!(lifecycle.connected_count(), 1);
    assert_eq!(client.attempts(), 0);
    client.reset();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connect_is_rejected_while_connected() {
    let (connector, mut accepted) = DuplexConnector::new();
    let client = client_with(connector.clone(), Arc::default(), fast_settings());

    assert!(client.connect(connection()).unwrap());
    let (_server, _) = ServerSide::accept(&mut accepted).await;
    assert!(wait_until(Duration::from_secs(1), || client.is_connected()).await);

    assert!(!client.connect(connection()).unwrap());
    assert!(!client.attempt_connect(true));
    assert_eq!(connector.calls(), 1);
    client.reset();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalid_connection_config_is_refused() {
    let (connector, _accepted) = DuplexConnector::new();
    let client = client_with(connector, Arc::default(), fast_settings());

    let mut config = connection();
    config.expected_server_public_key.clear();
    assert!(matches!(client.connect(config), Err(ProtocolError::ConfigError(_))));
    assert_eq!(client.state(), ConnectionState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sends_reach_the_wire_in_call_order() {
    let (connector, mut accepted) = DuplexConnector::new();
    let client = client_with(connector, Arc::default(), fast_settings());

    client.connect(connection()).unwrap();
    let (mut server, _) = ServerSide::accept(&mut accepted).await;
    assert!(wait_until(Duration::from_secs(1), || client.is_connected()).await);

    for score in 0..200 {
        client.send_player_input(score).unwrap();
    }
    for score in 0..200 {
        assert_eq!(server.next_message().await, Message::PlayerInput { new_score: score });
    }
    client.reset();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders_never_interleave_bytes() {
    let (connector, mut accepted) = DuplexConnector::new();
    let client = client_with(connector, Arc::default(), fast_settings());

    client.connect(connection()).unwrap();
    let (mut server, _) = ServerSide::accept(&mut accepted).await;
    assert!(wait_until(Duration::from_secs(1), || client.is_connected()).await);

    let mut senders = Vec::new();
    for chat_id in 0..8i16 {
        let client = client.clone();
        senders.push(tokio::spawn(async move {
            for _ in 0..25 {
                client.send_chat(chat_id).unwrap();
            }
        }));
    }
    for sender in senders {
        sender.await.unwrap();
    }

    let mut per_sender = [0usize; 8];
    for _ in 0..200 {
        match server.next_message().await {
            Message::Chat { chat_id } => per_sender[chat_id as usize] += 1,
            other => panic!("unexpected message {other:?}"),
        }
    }
    assert!(per_sender.iter().all(|&count| count == 25));
    client.reset();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_inbound_bytes_arrive_in_order_and_unchanged() {
    let (connector, mut accepted) = DuplexConnector::new();
    let client = client_with(connector, Arc::default(), fast_settings());

    client.connect(connection()).unwrap();
    let (mut server, _) = ServerSide::accept(&mut accepted).await;
    assert!(wait_until(Duration::from_secs(1), || client.is_connected()).await);

    let mut sent = BytesMut::new();
    for i in 0..64u32 {
        let chunk: Vec<u8> = (0..(i * 37 % 500 + 1)).map(|b| (b + i) as u8).collect();
        server.writer.write_all(&chunk).await.unwrap();
        sent.extend_from_slice(&chunk);
    }
    server.writer.flush().await.unwrap();

    let mut received = BytesMut::new();
    let expected = sent.len();
    let complete = wait_until(Duration::from_secs(2), || {
        while let Some(buffer) = client.try_receive() {
            assert!(!buffer.is_empty());
            assert!(buffer.len() <= match_sync::config::MAX_MESSAGE_BYTES);
            received.extend_from_slice(&buffer);
        }
        received.len() >= expected
    })
    .await;

    assert!(complete);
    assert_eq!(received.freeze(), sent.freeze());
    client.reset();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_send_while_disconnected_is_dropped() {
    let (connector, _accepted) = DuplexConnector::new();
    let client = client_with(connector, Arc::default(), fast_settings());

    assert!(matches!(client.send_keep_alive(), Err(ProtocolError::NotConnected)));
    assert!(matches!(client.send_forfeit(), Err(ProtocolError::NotConnected)));
    assert!(matches!(
        client.send_core(Bytes::from_static(&[0, 2, 0, 0])),
        Err(ProtocolError::NotConnected)
    ));
    assert_eq!(client.metrics().snapshot().messages_sent, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disconnect_is_idempotent_and_clears_queues() {
    let (connector, mut accepted) = DuplexConnector::new();
    let client = client_with(connector, Arc::default(), fast_settings());

    client.connect(connection()).unwrap();
    let (mut server, _) = ServerSide::accept(&mut accepted).await;
    assert!(wait_until(Duration::from_secs(1), || client.is_connected()).await);

    server.send(&Message::KeepAlive).await;
    server.send(&Message::OpponentResumed).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.disconnect(true);
    client.disconnect(true);
    client.disconnect(false);

    assert_eq!(client.state(), ConnectionState::Idle);
    assert!(client.try_receive().is_none());
    assert!(client.connection_config().unwrap().is_disposed());
    assert!(matches!(client.send_forfeit(), Err(ProtocolError::NotConnected)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reset_forgets_the_match() {
    let (connector, mut accepted) = DuplexConnector::new();
    let client = client_with(connector, Arc::default(), fast_settings());

    client.connect(connection()).unwrap();
    let (_server, _) = ServerSide::accept(&mut accepted).await;
    assert!(wait_until(Duration::from_secs(1), || client.is_connected()).await);

    client.set_read_timeout(Duration::from_millis(1234));
    client.reset();

    assert_eq!(client.state(), ConnectionState::Idle);
    assert!(client.connection_config().is_none());
    assert_eq!(client.read_timeout(), fast_settings().read_timeout);
    assert_eq!(client.attempts(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_server_only_messages_are_refused() {
    let (connector, mut accepted) = DuplexConnector::new();
    let client = client_with(connector, Arc::default(), fast_settings());

    client.connect(connection()).unwrap();
    let (mut server, _) = ServerSide::accept(&mut accepted).await;
    assert!(wait_until(Duration::from_secs(1), || client.is_connected()).await);

    let err = client
        .send(&Message::MatchOver {
            player_score: 1,
            opponent_score: 0,
        })
        .unwrap_err();
    assert!(matches!(err, ProtocolError::UnexpectedMessage(_)));

    client.send(&Message::Chat { chat_id: 3 }).unwrap();
    assert_eq!(server.next_message().await, Message::Chat { chat_id: 3 });
    client.reset();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dropping_the_last_handle_closes_the_stream() {
    use futures::StreamExt;

    let (connector, mut accepted) = DuplexConnector::new();
    let client = client_with(connector, Arc::default(), fast_settings());

    client.connect(connection()).unwrap();
    let (mut server, _) = ServerSide::accept(&mut accepted).await;
    assert!(wait_until(Duration::from_secs(1), || client.is_connected()).await);

    let other = client.clone();
    drop(other);
    client.send_keep_alive().unwrap();
    assert_eq!(server.next_message().await, Message::KeepAlive);

    drop(client);
    let next = tokio::time::timeout(Duration::from_secs(2), server.frames.next())
        .await
        .expect("stream closes");
    assert!(next.is_none());
}
