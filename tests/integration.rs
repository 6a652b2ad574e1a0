//! End-to-end session tests over an in-memory transport.
//!
//! The fake peer sees every PDU the session sends and injects arbitrary
//! PDUs back, so full request/response conversations run without a
//! socket.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;

use bluewire::advert::AddressKind;
use bluewire::att::AttUuid;
use bluewire::transport::{
    BoxFuture, Channel, ConnectParams, Connection, SecurityLevel, Transport,
};
use bluewire::{
    AdvertisingReport, BdAddr, BluewireError, DiscoveryMode, Result, Session, SessionConfig,
    SessionEvent, SessionState,
};

// --- fake transport -------------------------------------------------------

struct FakeChannel {
    tx: mpsc::Sender<Bytes>,
}

impl Channel for FakeChannel {
    fn send(&self, pdu: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.tx
                .send(pdu)
                .await
                .map_err(|_| BluewireError::Disconnected)
        })
    }

    fn set_security_level(&self, _level: SecurityLevel) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// The remote end of one fake connection.
struct Peer {
    /// PDUs the session sent.
    sent: mpsc::Receiver<Bytes>,
    /// Injects PDUs toward the session. Dropping it closes the channel.
    inject: mpsc::Sender<Bytes>,
}

impl Peer {
    async fn next_pdu(&mut self) -> Bytes {
        timeout(Duration::from_secs(1), self.sent.recv())
            .await
            .expect("timed out waiting for a PDU")
            .expect("session side closed")
    }

    async fn reply(&self, pdu: &[u8]) {
        self.inject.send(Bytes::copy_from_slice(pdu)).await.unwrap();
    }
}

struct FakeTransport {
    connections: Mutex<VecDeque<Connection>>,
}

impl FakeTransport {
    /// Transport with `count` pre-wired connections, in connect order.
    fn with_connections(count: usize) -> (Arc<Self>, Vec<Peer>) {
        let mut connections = VecDeque::new();
        let mut peers = Vec::new();
        for _ in 0..count {
            let (out_tx, out_rx) = mpsc::channel(32);
            let (in_tx, in_rx) = mpsc::channel(32);
            connections.push_back(Connection {
                channel: Box::new(FakeChannel { tx: out_tx }),
                inbound: in_rx,
            });
            peers.push(Peer {
                sent: out_rx,
                inject: in_tx,
            });
        }
        (
            Arc::new(Self {
                connections: Mutex::new(connections),
            }),
            peers,
        )
    }
}

impl Transport for FakeTransport {
    fn connect(&self, _params: ConnectParams) -> BoxFuture<'_, Result<Connection>> {
        Box::pin(async move {
            self.connections
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| {
                    BluewireError::Transport(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "no device",
                    ))
                })
        })
    }
}

struct RefusingTransport;

impl Transport for RefusingTransport {
    fn connect(&self, _params: ConnectParams) -> BoxFuture<'_, Result<Connection>> {
        Box::pin(async {
            Err(BluewireError::Transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "no device",
            )))
        })
    }
}

// --- harness --------------------------------------------------------------

fn remote() -> BdAddr {
    "AA:BB:CC:DD:EE:FF".parse().unwrap()
}

async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Session connected to a single fake peer, with the connect-phase
/// `StatusChanged` events drained.
async fn connected(
    config: SessionConfig,
) -> (Session, Peer, mpsc::Receiver<SessionEvent>) {
    let (transport, mut peers) = FakeTransport::with_connections(1);
    let (events_tx, mut events) = mpsc::channel(32);
    let (session, _task) = Session::spawn(transport, config, events_tx);

    session.connect(remote(), AddressKind::Public).await.unwrap();

    // Connecting, then Connected.
    for expected in [SessionState::Connecting, SessionState::Connected] {
        match next_event(&mut events).await {
            SessionEvent::StatusChanged(status) => assert_eq!(status.state, expected),
            other => panic!("unexpected event {other:?}"),
        }
    }

    (session, peers.remove(0), events)
}

// --- scenarios ------------------------------------------------------------

#[tokio::test]
async fn connect_reports_remote_and_zero_mtu() {
    let (session, _peer, _events) = connected(SessionConfig::default()).await;

    let status = session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Connected);
    assert_eq!(status.remote, Some(remote()));
    assert_eq!(status.mtu, 0);
}

#[tokio::test]
async fn connect_while_connected_is_a_silent_noop() {
    let (session, _peer, mut events) = connected(SessionConfig::default()).await;

    session.connect(remote(), AddressKind::Public).await.unwrap();

    let status = session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Connected);
    assert!(events.try_recv().is_err(), "no event for the no-op");
}

#[tokio::test]
async fn connect_failure_emits_event_and_returns_to_disconnected() {
    let (events_tx, mut events) = mpsc::channel(32);
    let (session, _task) =
        Session::spawn(Arc::new(RefusingTransport), SessionConfig::default(), events_tx);

    let result = session.connect(remote(), AddressKind::Public).await;
    assert!(matches!(result, Err(BluewireError::Transport(_))));

    match next_event(&mut events).await {
        SessionEvent::StatusChanged(status) => assert_eq!(status.state, SessionState::Connecting),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::ConnectFailed { .. }
    ));

    let status = session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Disconnected);
    assert_eq!(status.remote, None);
}

#[tokio::test]
async fn exchange_mtu_negotiates_the_minimum() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    let op = {
        let session = session.clone();
        tokio::spawn(async move { session.exchange_mtu(247).await })
    };

    let request = peer.next_pdu().await;
    assert_eq!(&request[..], &[0x02, 247, 0x00]);

    peer.reply(&[0x03, 100, 0x00]).await;
    assert_eq!(op.await.unwrap().unwrap(), 100);

    let status = session.status().await.unwrap();
    assert_eq!(status.mtu, 100);
}

#[tokio::test]
async fn exchange_mtu_is_single_shot_per_connection() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    let op = {
        let session = session.clone();
        tokio::spawn(async move { session.exchange_mtu(185).await })
    };
    peer.next_pdu().await;
    peer.reply(&[0x03, 0x00, 0x02]).await;
    // Peer offered 512, we asked 185.
    assert_eq!(op.await.unwrap().unwrap(), 185);

    let second = session.exchange_mtu(247).await;
    assert!(matches!(second, Err(BluewireError::BadState(_))));
}

#[tokio::test]
async fn exchange_mtu_rejects_out_of_range_values() {
    let (session, _peer, _events) = connected(SessionConfig::default()).await;

    assert!(matches!(
        session.exchange_mtu(22).await,
        Err(BluewireError::BadParam(_))
    ));
    assert!(matches!(
        session.exchange_mtu(518).await,
        Err(BluewireError::BadParam(_))
    ));
}

#[tokio::test]
async fn read_by_handle_returns_the_value() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    let op = {
        let session = session.clone();
        tokio::spawn(async move { session.read_by_handle(0x002A).await })
    };

    let request = peer.next_pdu().await;
    assert_eq!(&request[..], &[0x0A, 0x2A, 0x00]);

    peer.reply(&[0x0B, 0xDE, 0xAD]).await;
    assert_eq!(op.await.unwrap().unwrap(), vec![0xDE, 0xAD]);
}

#[tokio::test]
async fn read_by_handle_rejects_handle_zero() {
    let (session, _peer, _events) = connected(SessionConfig::default()).await;

    assert!(matches!(
        session.read_by_handle(0).await,
        Err(BluewireError::BadParam(_))
    ));
}

#[tokio::test]
async fn read_by_uuid_returns_handle_value_pairs() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    let op = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .read_by_uuid(0x0001, 0xFFFF, AttUuid::Uuid16(0x2A00))
                .await
        })
    };

    let request = peer.next_pdu().await;
    assert_eq!(&request[..], &[0x08, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x2A]);

    peer.reply(&[0x09, 4, 0x21, 0x00, 0xAA, 0xBB, 0x25, 0x00, 0xCC, 0xDD])
        .await;
    let pairs = op.await.unwrap().unwrap();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].handle, 0x0021);
    assert_eq!(pairs[1].value, vec![0xCC, 0xDD]);
}

#[tokio::test]
async fn read_by_uuid_rejects_bad_range() {
    let (session, _peer, _events) = connected(SessionConfig::default()).await;

    assert!(matches!(
        session.read_by_uuid(0, 0xFFFF, AttUuid::Uuid16(0x2A00)).await,
        Err(BluewireError::BadParam(_))
    ));
    assert!(matches!(
        session.read_by_uuid(0x0010, 0x0001, AttUuid::Uuid16(0x2A00)).await,
        Err(BluewireError::BadParam(_))
    ));
}

#[tokio::test]
async fn write_with_response_resolves_on_ack() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    let op = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .write_with_response(0x002A, Bytes::from_static(&[0x01]))
                .await
        })
    };

    let request = peer.next_pdu().await;
    assert_eq!(&request[..], &[0x12, 0x2A, 0x00, 0x01]);

    peer.reply(&[0x13]).await;
    op.await.unwrap().unwrap();
}

#[tokio::test]
async fn write_with_response_accepts_an_execute_write_ack() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    let op = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .write_with_response(0x0040, Bytes::from_static(&[0xEE]))
                .await
        })
    };
    peer.next_pdu().await;

    // Execute Write Response acknowledges a write just like 0x13.
    peer.reply(&[0x19]).await;
    op.await.unwrap().unwrap();
}

#[tokio::test]
async fn mismatched_response_kind_is_a_protocol_error() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    let op = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .write_with_response(0x002A, Bytes::from_static(&[0x01]))
                .await
        })
    };
    peer.next_pdu().await;

    // A Read Response can never answer a write request.
    peer.reply(&[0x0B, 0xAA]).await;

    assert!(matches!(
        op.await.unwrap(),
        Err(BluewireError::Protocol(_))
    ));

    // The peer bug costs the request, not the connection.
    let status = session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Connected);
}

#[tokio::test]
async fn write_without_response_sends_a_command() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    session
        .write_without_response(0x0015, Bytes::from_static(&[0x56, 0x01]))
        .await
        .unwrap();

    let sent = peer.next_pdu().await;
    assert_eq!(&sent[..], &[0x52, 0x15, 0x00, 0x56, 0x01]);
}

#[tokio::test]
async fn peer_rejection_surfaces_as_rejected() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    let op = {
        let session = session.clone();
        tokio::spawn(async move { session.read_by_handle(0x0099).await })
    };
    peer.next_pdu().await;

    // Error Response: read request, handle 0x0099, invalid handle.
    peer.reply(&[0x01, 0x0A, 0x99, 0x00, 0x01]).await;

    match op.await.unwrap() {
        Err(BluewireError::Rejected {
            request, handle, ..
        }) => {
            assert_eq!(request, 0x0A);
            assert_eq!(handle, 0x0099);
        }
        other => panic!("unexpected result {other:?}"),
    }

    // The rejection does not disturb the session.
    let status = session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Connected);
}

#[tokio::test]
async fn only_one_request_may_be_pending() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    let op = {
        let session = session.clone();
        tokio::spawn(async move { session.read_by_handle(0x0001).await })
    };
    peer.next_pdu().await;

    let second = session.read_by_handle(0x0002).await;
    assert!(matches!(second, Err(BluewireError::BadState(_))));

    // The first request is untouched.
    peer.reply(&[0x0B, 0x01]).await;
    assert_eq!(op.await.unwrap().unwrap(), vec![0x01]);
}

#[tokio::test]
async fn notification_becomes_an_event() {
    let (_session, peer, mut events) = connected(SessionConfig::default()).await;

    peer.reply(&[0x1B, 0x2A, 0x00, 0x17]).await;

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Notification {
            handle: 0x002A,
            value: Bytes::from_static(&[0x17]),
        }
    );
}

#[tokio::test]
async fn indication_is_confirmed_and_delivered() {
    let (_session, mut peer, mut events) = connected(SessionConfig::default()).await;

    peer.reply(&[0x1D, 0x15, 0x00, 0xAB, 0xCD]).await;

    let confirmation = peer.next_pdu().await;
    assert_eq!(&confirmation[..], &[0x1E]);

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Indication {
            handle: 0x0015,
            value: Bytes::from_static(&[0xAB, 0xCD]),
        }
    );
}

#[tokio::test]
async fn unsupported_server_request_is_answered_on_the_wire() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    // Server-initiated Read By Type Request.
    peer.reply(&[0x08, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x2A]).await;

    let answer = peer.next_pdu().await;
    assert_eq!(&answer[..], &[0x01, 0x08, 0x01, 0x00, 0x06]);

    // Answered locally; nothing surfaced, session fine.
    let status = session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Connected);
}

#[tokio::test]
async fn short_frame_disconnects_with_protocol_violation() {
    let (session, peer, mut events) = connected(SessionConfig::default()).await;

    // Notification with its handle cut off.
    peer.reply(&[0x1B, 0x2A]).await;

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::ProtocolViolation { .. }
    ));
    match next_event(&mut events).await {
        SessionEvent::StatusChanged(status) => {
            assert_eq!(status.state, SessionState::Disconnected);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let status = session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Disconnected);
}

#[tokio::test]
async fn disconnect_resolves_pending_and_resets_mtu() {
    let (session, mut peer, _events) = connected(SessionConfig::default()).await;

    // Negotiate an MTU first.
    let op = {
        let session = session.clone();
        tokio::spawn(async move { session.exchange_mtu(247).await })
    };
    peer.next_pdu().await;
    peer.reply(&[0x03, 247, 0x00]).await;
    op.await.unwrap().unwrap();

    // Leave a read outstanding, then disconnect.
    let op = {
        let session = session.clone();
        tokio::spawn(async move { session.read_by_handle(0x0001).await })
    };
    peer.next_pdu().await;

    session.disconnect().await.unwrap();
    assert!(matches!(
        op.await.unwrap(),
        Err(BluewireError::Disconnected)
    ));

    let status = session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Disconnected);
    assert_eq!(status.mtu, 0);
    assert_eq!(status.remote, None);
}

#[tokio::test]
async fn operations_while_disconnected_are_bad_state() {
    let (events_tx, _events) = mpsc::channel(32);
    let (session, _task) =
        Session::spawn(Arc::new(RefusingTransport), SessionConfig::default(), events_tx);

    assert!(matches!(
        session.exchange_mtu(247).await,
        Err(BluewireError::BadState(_))
    ));
    assert!(matches!(
        session.read_by_handle(0x0001).await,
        Err(BluewireError::BadState(_))
    ));
    assert!(matches!(
        session
            .write_without_response(0x0001, Bytes::from_static(&[0x00]))
            .await,
        Err(BluewireError::BadState(_))
    ));
}

#[tokio::test]
async fn peer_closing_the_channel_disconnects_the_session() {
    let (session, peer, mut events) = connected(SessionConfig::default()).await;

    drop(peer);

    match next_event(&mut events).await {
        SessionEvent::StatusChanged(status) => {
            assert_eq!(status.state, SessionState::Disconnected);
        }
        other => panic!("unexpected event {other:?}"),
    }
    let status = session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Disconnected);
}

#[tokio::test]
async fn request_timeout_resolves_pending_and_drops_the_late_reply() {
    let config = SessionConfig {
        request_timeout: Some(Duration::from_millis(50)),
        ..SessionConfig::default()
    };
    let (session, mut peer, _events) = connected(config).await;

    let op = {
        let session = session.clone();
        tokio::spawn(async move { session.read_by_handle(0x0001).await })
    };
    peer.next_pdu().await;

    assert!(matches!(op.await.unwrap(), Err(BluewireError::Timeout)));

    // The late reply must not poison the next request.
    peer.reply(&[0x0B, 0xFF]).await;

    let op = {
        let session = session.clone();
        tokio::spawn(async move { session.read_by_handle(0x0002).await })
    };
    peer.next_pdu().await;
    peer.reply(&[0x0B, 0x42]).await;
    assert_eq!(op.await.unwrap().unwrap(), vec![0x42]);
}

#[tokio::test]
async fn reconnect_after_disconnect_uses_a_fresh_registry() {
    let (transport, mut peers) = FakeTransport::with_connections(2);
    let (events_tx, _events) = mpsc::channel(64);
    let (session, _task) = Session::spawn(transport, SessionConfig::default(), events_tx);

    session.connect(remote(), AddressKind::Public).await.unwrap();
    session.disconnect().await.unwrap();
    session.connect(remote(), AddressKind::Public).await.unwrap();

    // The second connection still answers unsupported requests.
    let second = &mut peers[1];
    second.reply(&[0x0A, 0x01, 0x00]).await;
    let answer = second.next_pdu().await;
    assert_eq!(&answer[..], &[0x01, 0x0A, 0x01, 0x00, 0x06]);
}

#[tokio::test]
async fn security_level_is_reflected_in_status() {
    let (session, _peer, _events) = connected(SessionConfig::default()).await;

    session
        .set_security_level(SecurityLevel::Medium)
        .await
        .unwrap();

    let status = session.status().await.unwrap();
    assert_eq!(status.security, SecurityLevel::Medium);
}

// --- advertisement scenario ----------------------------------------------

#[test]
fn advertising_report_scenario() {
    let eir = [
        0x07, 0x09, b'W', b'i', b'd', b'g', b'e', b't', // complete name
        0x02, 0x01, 0x06, // flags: general discoverable
    ];
    let report = AdvertisingReport::decode(remote(), AddressKind::Public, -60, &eir);

    assert!(!report.truncated);
    assert_eq!(report.local_name(), Some(&b"Widget"[..]));
    assert_eq!(report.flags().unwrap().0, 0x06);
    assert!(DiscoveryMode::General.passes(&report));
    assert!(!DiscoveryMode::Limited.passes(&report));
    assert!(DiscoveryMode::None.passes(&report));
}
