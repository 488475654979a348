//! The update consumer wired to a live client over the scripted connector.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use codescope_core::{Message, MessageType, ProjectId, QueryKey, Topic};
use codescope_realtime::mock::{MockConnector, MockOutcome};
use codescope_realtime::{ClientConfig, ClientSlot, ConnectionState, RealtimeClient};
use codescope_sync::consumer::{ANALYSIS_COMPLETE_TITLE, CONNECTION_LOST_TITLE};
use codescope_sync::{ConsumerGuard, MemoryQueryCache, NotificationLevel, RecordingNotifier, UpdateConsumer};

struct Harness {
    slot: ClientSlot,
    client: Arc<RealtimeClient>,
    cache: Arc<MemoryQueryCache>,
    notes: Arc<RecordingNotifier>,
    /// Fires after the consumer has handled each message.
    handled: mpsc::UnboundedReceiver<Message>,
    _guard: ConsumerGuard,
}

fn harness(config: ClientConfig, connector: Arc<MockConnector>) -> Harness {
    let cache = Arc::new(MemoryQueryCache::new());
    let notes = Arc::new(RecordingNotifier::new());
    let consumer = Arc::new(UpdateConsumer::new(cache.clone(), notes.clone()));
    let (tx, handled) = mpsc::unbounded_channel();

    let slot = ClientSlot::with_connector(config, connector);
    let mut guard = None;
    let client = slot
        .get_or_connect_with(|client| {
            guard = Some(consumer.attach(client.registry()));
            let _watcher = client.subscribe(Topic::Any, move |m: &Message| {
                let _ = tx.send(m.clone());
                Ok(())
            });
        })
        .unwrap();

    Harness {
        slot,
        client,
        cache,
        notes,
        handled,
        _guard: guard.unwrap(),
    }
}

async fn handled_until(h: &mut Harness, ty: MessageType) {
    loop {
        let m = h.handled.recv().await.unwrap();
        if m.message_type() == &ty {
            return;
        }
    }
}

fn config() -> ClientConfig {
    ClientConfig::for_origin("https://codescope.dev")
}

#[tokio::test(start_paused = true)]
async fn graph_update_invalidates_only_that_graph() {
    let (connector, mut servers) = MockConnector::new([MockOutcome::Accept]);
    let mut h = harness(config(), connector);
    let p1 = ProjectId::from_raw("p1");
    let p2 = ProjectId::from_raw("p2");
    h.cache.insert(QueryKey::project_graph(&p1), serde_json::json!({"nodes": []}));
    h.cache.insert(QueryKey::project_graph(&p2), serde_json::json!({"nodes": []}));

    let server = servers.recv().await.unwrap();
    handled_until(&mut h, MessageType::Connected).await;
    assert!(server.push_text(r#"{"type":"knowledge_graph_update","projectId":"p1"}"#));
    handled_until(&mut h, MessageType::KnowledgeGraphUpdate).await;

    assert_eq!(h.cache.invalidated_keys(), vec![QueryKey::project_graph(&p1)]);
    assert_eq!(h.cache.is_stale(&QueryKey::project_graph(&p1)), Some(true));
    assert_eq!(h.cache.is_stale(&QueryKey::project_graph(&p2)), Some(false));
    assert!(h.notes.is_empty());
    h.slot.close().await;
}

#[tokio::test(start_paused = true)]
async fn completed_analysis_refreshes_lists_and_notifies() {
    let (connector, mut servers) = MockConnector::new([MockOutcome::Accept]);
    let mut h = harness(config(), connector);
    let search_page = QueryKey::search().child("parser").child("{}").child("2");
    h.cache.insert(search_page.clone(), serde_json::json!([]));

    let server = servers.recv().await.unwrap();
    handled_until(&mut h, MessageType::Connected).await;
    assert!(server.push_text(r#"{"type":"analysis_update","status":"completed","jobId":"j1"}"#));
    handled_until(&mut h, MessageType::AnalysisUpdate).await;

    assert_eq!(
        h.cache.invalidated_keys(),
        vec![QueryKey::jobs(), QueryKey::projects(), QueryKey::search()]
    );
    assert_eq!(h.cache.is_stale(&search_page), Some(true));
    let notes = h.notes.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, ANALYSIS_COMPLETE_TITLE);
    h.slot.close().await;
}

#[tokio::test(start_paused = true)]
async fn exhaustion_warns_exactly_once() {
    let (connector, _servers) = MockConnector::refusing();
    let mut h = harness(config().with_max_reconnect_attempts(2), connector.clone());

    handled_until(&mut h, MessageType::MaxReconnectAttemptsReached).await;
    assert_eq!(h.client.state(), ConnectionState::Exhausted);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.attempt_count(), 3);

    let notes = h.notes.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Warning);
    assert_eq!(notes[0].title, CONNECTION_LOST_TITLE);
    assert!(notes[0].persistent);
    h.slot.close().await;
}

#[tokio::test(start_paused = true)]
async fn closing_the_slot_detaches_everything() {
    let (connector, mut servers) = MockConnector::new([MockOutcome::Accept]);
    let h = harness(config(), connector);
    let mut server = servers.recv().await.unwrap();

    h.slot.close().await;
    assert!(h.client.registry().is_empty());
    assert!(h.slot.current().is_none());
    assert_eq!(server.next_outbound().await, None);
    assert!(!server.push_text(r#"{"type":"search_update"}"#));
    assert!(h.cache.invalidations().is_empty());
}
