//! Connection lifecycle tests against the scripted connector, on paused time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use codescope_core::{Message, MessageType, ProjectId, Topic};
use codescope_realtime::mock::{MockConnector, MockOutcome, MockServerEnd};
use codescope_realtime::{ClientConfig, ConnectionState, Frame, RealtimeClient};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn client_with(connector: Arc<MockConnector>) -> RealtimeClient {
    RealtimeClient::with_connector(ClientConfig::for_origin("http://localhost:5000"), connector)
        .unwrap()
}

/// Every dispatched message, in dispatch order.
fn record_all(client: &RealtimeClient) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _sub = client.subscribe(Topic::Any, move |m: &Message| {
        let _ = tx.send(m.clone());
        Ok(())
    });
    rx
}

fn drain_types(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<MessageType> {
    let mut out = Vec::new();
    while let Ok(m) = rx.try_recv() {
        out.push(m.message_type().clone());
    }
    out
}

async fn wait_for_state(client: &RealtimeClient, target: ConnectionState) {
    let _ = client
        .watch_state()
        .wait_for(|s| *s == target)
        .await
        .unwrap();
}

fn gaps(attempts: &[Instant]) -> Vec<Duration> {
    attempts.windows(2).map(|w| w[1] - w[0]).collect()
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_then_exhausts_once() {
    let (connector, _servers) = MockConnector::refusing();
    let client = client_with(connector.clone());
    let mut seen = record_all(&client);

    client.connect();
    wait_for_state(&client, ConnectionState::Exhausted).await;

    assert_eq!(connector.attempt_count(), 6);
    assert_eq!(
        gaps(&connector.attempts()),
        vec![secs(1), secs(2), secs(4), secs(8), secs(16)]
    );

    tokio::time::sleep(secs(3600)).await;
    assert_eq!(connector.attempt_count(), 6);
    assert_eq!(client.state(), ConnectionState::Exhausted);

    let types = drain_types(&mut seen);
    let count = |t: MessageType| types.iter().filter(|x| **x == t).count();
    assert_eq!(count(MessageType::MaxReconnectAttemptsReached), 1);
    assert_eq!(count(MessageType::Error), 6);
    assert_eq!(count(MessageType::Disconnected), 6);
    assert_eq!(types.last(), Some(&MessageType::MaxReconnectAttemptsReached));
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_attempt_emits_error_then_disconnected() {
    let (connector, _servers) = MockConnector::new([MockOutcome::Refuse("refused by test".into())]);
    let client = client_with(connector);
    let mut seen = record_all(&client);

    client.connect();
    wait_for_state(&client, ConnectionState::Reconnecting).await;

    let error = seen.recv().await.unwrap();
    assert_eq!(error.message_type(), &MessageType::Error);
    assert!(error.str_field("error").unwrap().contains("refused by test"));
    assert_eq!(seen.recv().await.unwrap().message_type(), &MessageType::Disconnected);
    assert_eq!(client.reconnect_attempts(), 1);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn open_resets_backoff_to_base() {
    let (connector, mut servers) = MockConnector::new([
        MockOutcome::refuse(),
        MockOutcome::refuse(),
        MockOutcome::Accept,
    ]);
    let client = client_with(connector.clone());

    client.connect();
    let server = servers.recv().await.unwrap();
    wait_for_state(&client, ConnectionState::Open).await;
    assert_eq!(client.reconnect_attempts(), 0);

    server.close();
    wait_for_state(&client, ConnectionState::Reconnecting).await;
    assert_eq!(client.reconnect_attempts(), 1);
    let closed_at = Instant::now();

    // Fourth attempt is refused; wait until the fifth is scheduled.
    tokio::time::sleep(secs(2)).await;
    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 4);
    assert_eq!(attempts[3] - closed_at, secs(1));
    assert_eq!(gaps(&attempts)[..2], [secs(1), secs(2)]);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn close_goes_through_reconnecting_to_a_new_attempt() {
    let (connector, mut servers) = MockConnector::new([MockOutcome::Accept, MockOutcome::Accept]);
    let client = client_with(connector.clone());
    let mut seen = record_all(&client);

    client.connect();
    let first = servers.recv().await.unwrap();
    wait_for_state(&client, ConnectionState::Open).await;

    assert!(first.push_close());
    wait_for_state(&client, ConnectionState::Reconnecting).await;
    let closed_at = Instant::now();

    let _second = servers.recv().await.unwrap();
    wait_for_state(&client, ConnectionState::Open).await;
    assert_eq!(connector.attempts()[1] - closed_at, secs(1));
    assert_eq!(
        drain_types(&mut seen),
        vec![
            MessageType::Connected,
            MessageType::Disconnected,
            MessageType::Connected
        ]
    );
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_runs_only_while_open() {
    let (connector, mut servers) = MockConnector::new([MockOutcome::Accept]);
    let client = client_with(connector);

    client.connect();
    let mut server: MockServerEnd = servers.recv().await.unwrap();
    wait_for_state(&client, ConnectionState::Open).await;
    let opened_at = Instant::now();

    assert_eq!(server.next_outbound().await, Some(Frame::Text(r#"{"type":"ping"}"#.into())));
    assert_eq!(opened_at.elapsed(), secs(30));
    assert_eq!(server.next_outbound().await, Some(Frame::Text(r#"{"type":"ping"}"#.into())));
    assert_eq!(opened_at.elapsed(), secs(60));

    // Close mid-interval: the session ends before the next ping is due.
    tokio::time::sleep(secs(15)).await;
    assert!(server.push_close());
    assert_eq!(server.next_outbound().await, None);
    assert!(opened_at.elapsed() < secs(90));
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn send_while_not_open_changes_nothing() {
    let (connector, _servers) = MockConnector::refusing();
    let client = client_with(connector.clone());
    let mut seen = record_all(&client);

    client.connect();
    wait_for_state(&client, ConnectionState::Reconnecting).await;
    let before = drain_types(&mut seen);

    assert!(!client.send(Message::ping()));
    assert!(!client.subscribe_to_project(&ProjectId::from_raw("p1")));
    assert!(!client.ping());

    assert_eq!(client.state(), ConnectionState::Reconnecting);
    assert_eq!(client.reconnect_attempts(), 1);
    assert!(drain_types(&mut seen).is_empty());
    assert_eq!(before, vec![MessageType::Error, MessageType::Disconnected]);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn messages_arrive_in_order_and_malformed_frames_are_dropped() {
    let (connector, mut servers) = MockConnector::new([MockOutcome::Accept]);
    let client = client_with(connector);
    let mut seen = record_all(&client);

    client.connect();
    let server = servers.recv().await.unwrap();
    assert_eq!(seen.recv().await.unwrap().message_type(), &MessageType::Connected);

    assert!(server.push_text(r#"{"type":"analysis_update","status":"running"}"#));
    assert!(server.push_text("not json"));
    assert!(server.push_text(r#"{"status":"no type"}"#));
    assert!(server.push_frame(Frame::Binary(vec![0xff, 0x00])));
    assert!(server.push_text(r#"{"type":"search_update"}"#));
    assert!(server.push_text(r#"{"type":"embedding_progress","pct":40}"#));

    let types: Vec<_> = [
        seen.recv().await.unwrap(),
        seen.recv().await.unwrap(),
        seen.recv().await.unwrap(),
    ]
    .iter()
    .map(|m| m.message_type().clone())
    .collect();
    assert_eq!(
        types,
        vec![
            MessageType::AnalysisUpdate,
            MessageType::SearchUpdate,
            MessageType::Other("embedding_progress".into())
        ]
    );
    assert_eq!(client.state(), ConnectionState::Open);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transport_error_is_dispatched_without_closing() {
    let (connector, mut servers) = MockConnector::new([MockOutcome::Accept]);
    let client = client_with(connector.clone());
    let mut seen = record_all(&client);

    client.connect();
    let server = servers.recv().await.unwrap();
    assert_eq!(seen.recv().await.unwrap().message_type(), &MessageType::Connected);

    assert!(server.push_error("frame too large"));
    let error = seen.recv().await.unwrap();
    assert_eq!(error.message_type(), &MessageType::Error);
    assert!(error.str_field("error").unwrap().contains("frame too large"));

    assert!(server.push_text(r#"{"type":"search_update"}"#));
    assert_eq!(seen.recv().await.unwrap().message_type(), &MessageType::SearchUpdate);
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(connector.attempt_count(), 1);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn outbound_messages_reach_the_server() {
    let (connector, mut servers) = MockConnector::new([MockOutcome::Accept]);
    let client = client_with(connector);

    client.connect();
    let mut server = servers.recv().await.unwrap();
    wait_for_state(&client, ConnectionState::Open).await;

    assert!(client.subscribe_to_project(&ProjectId::from_raw("p1")));
    let msg = server.next_message().await.unwrap();
    assert_eq!(msg.message_type(), &MessageType::SubscribeProject);
    assert_eq!(msg.str_field("projectId"), Some("p1"));

    assert!(client.ping());
    assert_eq!(server.next_message().await.unwrap().message_type(), &MessageType::Ping);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_reconnect() {
    let (connector, _servers) = MockConnector::refusing();
    let client = client_with(connector.clone());
    let mut seen = record_all(&client);

    client.connect();
    wait_for_state(&client, ConnectionState::Reconnecting).await;
    client.shutdown().await;
    let _ = drain_types(&mut seen);

    tokio::time::sleep(secs(60)).await;
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(seen.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_the_live_connection() {
    let (connector, mut servers) = MockConnector::new([MockOutcome::Accept]);
    let client = client_with(connector);

    client.connect();
    let mut server = servers.recv().await.unwrap();
    wait_for_state(&client, ConnectionState::Open).await;

    client.shutdown().await;
    assert_eq!(server.next_outbound().await, None);
    assert!(!server.is_client_connected());
    assert_eq!(client.state(), ConnectionState::Closed);
}
