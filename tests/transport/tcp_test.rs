// TCP Transport Tests
// Loopback connections exchanging length-prefixed frames

use peerpredict::transport::{
    Connection, TcpTransport, TcpTransportConfig, TransportError, TransportEvent,
};
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

fn loopback() -> TcpTransportConfig {
    TcpTransportConfig::new()
        .with_bind_address("127.0.0.1")
        .with_bind_port(0)
        .with_connect_timeout_secs(2)
}

async fn next_event(rx: &mut Receiver<TransportEvent>) -> TransportEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_connect_raises_events_on_both_sides() {
    let (alice, mut alice_rx) = TcpTransport::bind(loopback()).await.unwrap();
    let (bob, mut bob_rx) = TcpTransport::bind(loopback()).await.unwrap();

    let handle = alice
        .connect(&bob.local_address().to_string())
        .await
        .unwrap();

    match next_event(&mut alice_rx).await {
        TransportEvent::Connected { peer, outbound, .. } => {
            assert_eq!(peer, handle);
            assert!(outbound);
        }
        other => panic!("unexpected event {:?}", other),
    }
    match next_event(&mut bob_rx).await {
        TransportEvent::Connected { outbound, .. } => assert!(!outbound),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(alice.peer_count(), 1);
    assert_eq!(alice.peer_address(&handle), Some(bob.local_address()));
}

#[tokio::test]
async fn test_frames_arrive_intact_and_in_order() {
    let (alice, mut alice_rx) = TcpTransport::bind(loopback()).await.unwrap();
    let (bob, mut bob_rx) = TcpTransport::bind(loopback()).await.unwrap();
    let handle = alice
        .connect(&bob.local_address().to_string())
        .await
        .unwrap();
    next_event(&mut alice_rx).await;
    next_event(&mut bob_rx).await;

    alice.send(&handle, br#"{"type":"ping"}"#).unwrap();
    alice.send(&handle, b"second").unwrap();

    match next_event(&mut bob_rx).await {
        TransportEvent::Message { data, .. } => assert_eq!(data, br#"{"type":"ping"}"#.to_vec()),
        other => panic!("unexpected event {:?}", other),
    }
    match next_event(&mut bob_rx).await {
        TransportEvent::Message { data, .. } => assert_eq!(data, b"second".to_vec()),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_first_frame_never_precedes_connected() {
    let (alice, _alice_rx) = TcpTransport::bind(loopback()).await.unwrap();
    let (bob, mut bob_rx) = TcpTransport::bind(loopback()).await.unwrap();

    for round in 0..10u8 {
        let handle = alice
            .connect(&bob.local_address().to_string())
            .await
            .unwrap();
        alice.send(&handle, &[round]).unwrap();

        let inbound = match next_event(&mut bob_rx).await {
            TransportEvent::Connected { peer, outbound, .. } => {
                assert!(!outbound);
                peer
            }
            other => panic!("frame delivered before connect: {:?}", other),
        };
        match next_event(&mut bob_rx).await {
            TransportEvent::Message { peer, data } => {
                assert_eq!(peer, inbound);
                assert_eq!(data, vec![round]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        alice.disconnect(&handle).unwrap();
        loop {
            if let TransportEvent::Disconnected { .. } = next_event(&mut bob_rx).await {
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_broadcast_reaches_inbound_peers() {
    let (alice, mut alice_rx) = TcpTransport::bind(loopback()).await.unwrap();
    let (bob, mut bob_rx) = TcpTransport::bind(loopback()).await.unwrap();
    alice
        .connect(&bob.local_address().to_string())
        .await
        .unwrap();
    next_event(&mut alice_rx).await;
    next_event(&mut bob_rx).await;

    assert_eq!(bob.broadcast(b"hello"), 1);
    match next_event(&mut alice_rx).await {
        TransportEvent::Message { data, .. } => assert_eq!(data, b"hello".to_vec()),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_notifies_remote() {
    let (alice, mut alice_rx) = TcpTransport::bind(loopback()).await.unwrap();
    let (bob, mut bob_rx) = TcpTransport::bind(loopback()).await.unwrap();
    let handle = alice
        .connect(&bob.local_address().to_string())
        .await
        .unwrap();
    next_event(&mut alice_rx).await;
    next_event(&mut bob_rx).await;

    alice.disconnect(&handle).unwrap();

    assert!(matches!(
        next_event(&mut bob_rx).await,
        TransportEvent::Disconnected { .. }
    ));
    assert_eq!(alice.send(&handle, b"x"), Err(TransportError::NotConnected));
}

#[tokio::test]
async fn test_oversized_frame_is_refused() {
    let config = loopback().with_max_frame_bytes(8);
    let (alice, mut alice_rx) = TcpTransport::bind(config).await.unwrap();
    let (bob, _bob_rx) = TcpTransport::bind(loopback()).await.unwrap();
    let handle = alice
        .connect(&bob.local_address().to_string())
        .await
        .unwrap();
    next_event(&mut alice_rx).await;

    assert_eq!(
        alice.send(&handle, &[0u8; 9]),
        Err(TransportError::FrameTooLarge { size: 9, limit: 8 })
    );
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let (alice, _rx) = TcpTransport::bind(loopback()).await.unwrap();
    let port = {
        let (scratch, _scratch_rx) = TcpTransport::bind(loopback()).await.unwrap();
        let port = scratch.local_address().port();
        scratch.shutdown();
        port
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(alice.connect(&format!("127.0.0.1:{}", port)).await.is_err());
}
