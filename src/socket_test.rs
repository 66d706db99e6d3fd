use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::events::PushEvent;
use crate::test_support::{MockServer, SocketEnd, SocketScript};

const WAIT: Duration = Duration::from_secs(5);

fn socket_for(server: &MockServer, policy: ReconnectPolicy) -> (SocketConnection, UnboundedReceiver<PushEvent>) {
    let router = EventRouter::new();
    let events = router.bind_channel();
    let url = server.config().ws_endpoint().unwrap();
    let socket = SocketConnection::new(url, policy, Arc::new(StaticToken("sock-token".into())), router).unwrap();
    (socket, events)
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy { jitter_min_ms: 20, jitter_max_ms: 30, max_attempt: 15 }
}

async fn next_tag(events: &mut UnboundedReceiver<PushEvent>) -> String {
    let event = tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for push event")
        .expect("event channel closed");
    event.tag().to_string()
}

/// Skip the server's `authpromp` and return the tag after it.
async fn next_after_prompt(events: &mut UnboundedReceiver<PushEvent>) -> String {
    loop {
        let tag = next_tag(events).await;
        if tag != "authpromp" {
            return tag;
        }
    }
}

async fn wait_for_state(socket: &SocketConnection, target: ConnectionState) {
    let mut rx = socket.watch_state();
    tokio::time::timeout(WAIT, rx.wait_for(|state| *state == target))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {target:?}, at {:?}", socket.state()))
        .expect("state channel closed");
}

#[tokio::test]
async fn connect_authenticates_and_opens() {
    let server = MockServer::spawn().await;
    let (socket, mut events) = socket_for(&server, fast_policy());
    assert_eq!(socket.state(), ConnectionState::Idle);

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    wait_for_state(&socket, ConnectionState::Open).await;

    assert_eq!(server.socket_tokens(), vec!["sock-token".to_string()]);
    socket.close().await;
}

#[tokio::test]
async fn events_arrive_in_server_order() {
    let server = MockServer::spawn().await;
    server.push_script(SocketScript::Accept {
        events: vec![r#"{"type":"a"}"#.into(), r#"{"type":"b"}"#.into(), r#"{"type":"c"}"#.into()],
        end: SocketEnd::Hold,
    });
    let (socket, mut events) = socket_for(&server, fast_policy());

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    assert_eq!(next_tag(&mut events).await, "a");
    assert_eq!(next_tag(&mut events).await, "b");
    assert_eq!(next_tag(&mut events).await, "c");
    socket.close().await;
}

#[tokio::test]
async fn drop_emits_disconnected_then_reconnected() {
    let server = MockServer::spawn().await;
    server.push_script(SocketScript::Accept { events: Vec::new(), end: SocketEnd::Drop });
    let (socket, mut events) = socket_for(&server, fast_policy());

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    assert_eq!(next_tag(&mut events).await, "_disconnected");
    assert_eq!(next_tag(&mut events).await, "_reconnected");
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    wait_for_state(&socket, ConnectionState::Open).await;

    assert_eq!(server.connections().len(), 2);
    assert_eq!(server.socket_tokens().len(), 2);
    socket.close().await;
}

#[tokio::test]
async fn silent_drops_back_off_progressively() {
    let server = MockServer::spawn().await;
    for _ in 0..3 {
        server.push_script(SocketScript::DropImmediately);
    }
    let (socket, mut events) = socket_for(&server, fast_policy());

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "_disconnected");
    assert_eq!(next_tag(&mut events).await, "_disconnected");
    assert_eq!(next_tag(&mut events).await, "_disconnected");
    assert_eq!(next_tag(&mut events).await, "_reconnected");
    wait_for_state(&socket, ConnectionState::Open).await;

    let connections = server.connections();
    assert_eq!(connections.len(), 4);
    for (k, pair) in connections.windows(2).enumerate() {
        let gap = pair[1].duration_since(pair[0]);
        let floor = Duration::from_millis(fast_policy().jitter_min_ms * (u64::try_from(k).unwrap() + 1));
        assert!(gap >= floor, "gap {k} was {gap:?}, expected at least {floor:?}");
    }
    socket.close().await;
}

#[tokio::test]
async fn auth_rejection_halts_reconnects() {
    let server = MockServer::spawn().await;
    server.push_script(SocketScript::Reject);
    let (socket, mut events) = socket_for(&server, fast_policy());

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authpromptfailed");
    wait_for_state(&socket, ConnectionState::Closed(CloseReason::Rejected)).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connections().len(), 1);
    assert!(events.try_recv().is_err(), "no _disconnected after a rejection");
}

#[tokio::test]
async fn close_suppresses_reconnect() {
    let server = MockServer::spawn().await;
    let (socket, mut events) = socket_for(&server, fast_policy());

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    socket.close().await;
    assert_eq!(socket.state(), ConnectionState::Closed(CloseReason::Intentional));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connections().len(), 1);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn server_going_away_is_a_clean_close() {
    let server = MockServer::spawn().await;
    server.push_script(SocketScript::Accept { events: Vec::new(), end: SocketEnd::Close(1001) });
    let (socket, mut events) = socket_for(&server, fast_policy());

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    wait_for_state(&socket, ConnectionState::Closed(CloseReason::Intentional)).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connections().len(), 1);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn other_close_codes_reconnect() {
    let server = MockServer::spawn().await;
    server.push_script(SocketScript::Accept { events: Vec::new(), end: SocketEnd::Close(1011) });
    let (socket, mut events) = socket_for(&server, fast_policy());

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    assert_eq!(next_tag(&mut events).await, "_disconnected");
    assert_eq!(next_tag(&mut events).await, "_reconnected");
    socket.close().await;
}

#[tokio::test]
async fn connect_is_idempotent_while_active() {
    let server = MockServer::spawn().await;
    let (socket, mut events) = socket_for(&server, fast_policy());

    socket.connect();
    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    socket.connect();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connections().len(), 1);
    socket.close().await;
}

#[tokio::test]
async fn connect_during_backoff_dials_immediately() {
    let server = MockServer::spawn().await;
    server.push_script(SocketScript::Accept { events: Vec::new(), end: SocketEnd::Drop });
    let slow = ReconnectPolicy { jitter_min_ms: 30_000, jitter_max_ms: 30_000, max_attempt: 15 };
    let (socket, mut events) = socket_for(&server, slow);

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    assert_eq!(next_tag(&mut events).await, "_disconnected");

    socket.connect();
    assert_eq!(next_tag(&mut events).await, "_reconnected");
    assert_eq!(server.connections().len(), 2);
    socket.close().await;
}

#[tokio::test]
async fn reconnect_after_close_starts_fresh() {
    let server = MockServer::spawn().await;
    let (socket, mut events) = socket_for(&server, fast_policy());

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    socket.close().await;

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    wait_for_state(&socket, ConnectionState::Open).await;
    assert_eq!(server.connections().len(), 2);
    socket.close().await;
}

#[tokio::test]
async fn send_requires_a_connection() {
    let server = MockServer::spawn().await;
    let (socket, mut events) = socket_for(&server, fast_policy());

    assert_eq!(socket.send("ping", None), Err(ClientError::SocketClosed));

    socket.connect();
    assert_eq!(next_after_prompt(&mut events).await, "authok");
    assert!(socket.send("ping", None).is_ok());
    socket.close().await;

    assert_eq!(socket.send("ping", None), Err(ClientError::SocketClosed));
}

#[tokio::test]
async fn unreachable_server_keeps_retrying() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let router = EventRouter::new();
    let mut events = router.bind_channel();
    let socket =
        SocketConnection::new(format!("ws://{addr}/ws"), fast_policy(), Arc::new(StaticToken("t".into())), router)
            .unwrap();

    socket.connect();
    assert_eq!(next_tag(&mut events).await, "_disconnected");
    assert_eq!(next_tag(&mut events).await, "_disconnected");
    socket.close().await;
    assert_eq!(socket.state(), ConnectionState::Closed(CloseReason::Intentional));
}

#[test]
fn inconsistent_reconnect_policy_is_rejected() {
    let build = |policy| {
        SocketConnection::new("ws://127.0.0.1:1/ws".into(), policy, Arc::new(StaticToken("t".into())), EventRouter::new())
    };

    let zero_cap = ReconnectPolicy { jitter_min_ms: 20, jitter_max_ms: 30, max_attempt: 0 };
    assert!(matches!(build(zero_cap), Err(ClientError::Config(_))));

    let inverted = ReconnectPolicy { jitter_min_ms: 300, jitter_max_ms: 100, max_attempt: 3 };
    assert!(matches!(build(inverted), Err(ClientError::Config(_))));
}
