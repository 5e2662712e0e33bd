//! Threads, knowledge graph and settings through the store.

use chrono::{Duration, Utc};
use std::sync::Arc;
use teagarden_client::store::{selectors, OpKey, OperationKind};
use teagarden_client::{ErrorKind, GatewayError, Store};
use teagarden_core::*;
use teagarden_test_utils::{fixtures, Endpoint, MockGateway};

fn message(id: &str, agent_id: &str, text: &str, seconds_ago: i64) -> Message {
    Message {
        id: MessageId::from(id),
        agent_id: AgentId::from(agent_id),
        text: text.to_string(),
        sender: MessageSender::Agent,
        timestamp: Utc::now() - Duration::seconds(seconds_ago),
    }
}

async fn with_agents(gateway: MockGateway) -> (Arc<MockGateway>, Store) {
    let gateway = Arc::new(gateway.with_agents(fixtures::three_agents()));
    let store = fixtures::store(&gateway);
    store.load_agents().await.unwrap();
    (gateway, store)
}

// ============================================================================
// THREADS
// ============================================================================

#[tokio::test]
async fn test_load_thread_sorts_oldest_first() {
    let (_, store) = with_agents(MockGateway::new().with_messages(
        AgentId::from("1"),
        vec![
            message("m2", "1", "second", 10),
            message("m1", "1", "first", 60),
            message("m3", "1", "third", 1),
        ],
    ))
    .await;
    let id = AgentId::from("1");

    store.load_thread(&id).await.unwrap();
    let texts: Vec<String> =
        store.read(|s| selectors::thread(s, &id).iter().map(|m| m.text.clone()).collect());
    assert_eq!(texts, ["first", "second", "third"]);
}

#[tokio::test]
async fn test_load_thread_rejects_foreign_messages() {
    let (_, store) = with_agents(MockGateway::new().with_messages(
        AgentId::from("1"),
        vec![message("m1", "2", "misfiled", 5)],
    ))
    .await;
    let id = AgentId::from("1");

    let err = store.load_thread(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServerError);
    assert!(store.read(|s| selectors::thread(s, &id).is_empty()));
}

#[tokio::test]
async fn test_send_message_appends_server_message() {
    let (gateway, store) = with_agents(MockGateway::new().with_messages(
        AgentId::from("2"),
        vec![message("m1", "2", "Hello, how can I help?", 30)],
    ))
    .await;
    let id = AgentId::from("2");
    store.load_thread(&id).await.unwrap();

    let sent = store.send_message(&id, "Summarize the report").await.unwrap();
    assert!(!sent.id.is_provisional());
    assert_eq!(sent.sender, MessageSender::User);

    store.read(|s| {
        let thread = selectors::thread(s, &id);
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[1], sent);
        assert!(thread[0].timestamp <= thread[1].timestamp);
    });
    assert_eq!(gateway.messages(&id).len(), 2);
}

#[tokio::test]
async fn test_send_message_keeps_timestamps_ordered() {
    let future = Utc::now() + Duration::hours(1);
    let mut late = message("m1", "1", "from the future", 0);
    late.timestamp = future;
    let (_, store) =
        with_agents(MockGateway::new().with_messages(AgentId::from("1"), vec![late])).await;
    let id = AgentId::from("1");
    store.load_thread(&id).await.unwrap();

    let sent = store.send_message(&id, "hi").await.unwrap();
    assert!(sent.timestamp >= future);
}

#[tokio::test]
async fn test_send_message_failure_removes_optimistic_message() {
    let (gateway, store) = with_agents(MockGateway::new()).await;
    let id = AgentId::from("1");
    gateway.fail_next(Endpoint::PostMessage, GatewayError::network("down"));

    let err = store.send_message(&id, "hello?").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    store.read(|s| {
        assert!(selectors::thread(s, &id).is_empty());
        let key = OpKey::Thread(id.clone());
        assert!(selectors::error(s, OperationKind::SendMessage, key).is_some());
    });
}

#[tokio::test]
async fn test_send_message_validation() {
    let (gateway, store) = with_agents(MockGateway::new()).await;

    let err = store.send_message(&AgentId::from("1"), "  ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = store.send_message(&AgentId::from("9"), "hello").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(gateway.call_count(Endpoint::PostMessage), 0);
}

#[tokio::test]
async fn test_messages_to_one_agent_keep_send_order() {
    let (gateway, store) = with_agents(MockGateway::new()).await;
    let id = AgentId::from("1");
    let release = gateway.pause_next(Endpoint::PostMessage);

    let first = store.send_message(&id, "one");
    let second = store.send_message(&id, "two");
    let control = async {
        gateway.wait_for(Endpoint::PostMessage, 1).await;
        let visible = store.read(|s| selectors::thread(s, &id).len());
        let _ = release.send(());
        visible
    };
    let (first, second, visible) = tokio::join!(first, second, control);
    first.unwrap();
    second.unwrap();

    assert_eq!(visible, 1);
    let texts: Vec<String> =
        store.read(|s| selectors::thread(s, &id).iter().map(|m| m.text.clone()).collect());
    assert_eq!(texts, ["one", "two"]);
}

// ============================================================================
// GRAPH
// ============================================================================

#[tokio::test]
async fn test_load_graph_and_search() {
    let gateway = Arc::new(MockGateway::new().with_graph(fixtures::graph()));
    let store = fixtures::store(&gateway);
    store.load_graph().await.unwrap();

    store.read(|s| {
        let graph = selectors::graph(s);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.links.len(), 2);
        assert_eq!(graph.find_node("bra").map(|n| n.label.as_str()), Some("Bravo"));
        assert!(graph.find_node("zzz").is_none());
        assert!(graph.find_node("   ").is_none());
    });
}

#[tokio::test]
async fn test_load_graph_rejects_dangling_edges() {
    let mut graph = fixtures::graph();
    graph.nodes.pop();
    let gateway = Arc::new(MockGateway::new().with_graph(graph));
    let store = fixtures::store(&gateway);

    let err = store.load_graph().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServerError);
    assert!(store.read(|s| selectors::graph(s).nodes.is_empty()));
}

#[tokio::test]
async fn test_add_graph_node() {
    let gateway = Arc::new(MockGateway::new().with_graph(fixtures::graph()));
    let store = fixtures::store(&gateway);
    store.load_graph().await.unwrap();

    let node = store.add_graph_node("  Delta  ").await.unwrap();
    assert_eq!(node.label, "Delta");
    assert!(!node.id.is_provisional());
    store.read(|s| {
        assert_eq!(selectors::graph(s).nodes.len(), 4);
        assert!(selectors::graph(s).contains(&node.id));
    });
}

#[tokio::test]
async fn test_add_graph_node_acknowledged() {
    let gateway = Arc::new(MockGateway::new());
    gateway.acknowledge_creates(true);
    let store = fixtures::store(&gateway);

    let node = store.add_graph_node("Echo").await.unwrap();
    assert_eq!(node.id, NodeId::from("101"));
    assert_eq!(node.label, "Echo");
    assert_eq!(store.read(|s| selectors::graph(s).nodes.clone()), vec![node]);
}

#[tokio::test]
async fn test_add_graph_node_failure_and_blank_label() {
    let gateway = Arc::new(MockGateway::new().with_graph(fixtures::graph()));
    let store = fixtures::store(&gateway);
    store.load_graph().await.unwrap();

    let err = store.add_graph_node("").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(gateway.call_count(Endpoint::AddGraphNode), 0);

    gateway.fail_next(Endpoint::AddGraphNode, GatewayError::network("down"));
    assert!(store.add_graph_node("Delta").await.is_err());
    assert_eq!(store.read(|s| selectors::graph(s).nodes.len()), 3);
    store.read(|s| {
        assert!(selectors::error(s, OperationKind::AddGraphNode, OpKey::Graph).is_some());
    });
}

// ============================================================================
// SETTINGS
// ============================================================================

#[tokio::test]
async fn test_update_settings_before_load_is_not_found() {
    let gateway = Arc::new(MockGateway::new().with_settings(fixtures::settings()));
    let store = fixtures::store(&gateway);

    let patch = SettingsPatch {
        debug_mode: Some(true),
        ..SettingsPatch::default()
    };
    let err = store.update_settings(patch).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(gateway.call_count(Endpoint::UpdateSettings), 0);
}

#[tokio::test]
async fn test_update_settings() {
    let gateway = Arc::new(MockGateway::new().with_settings(fixtures::settings()));
    let store = fixtures::store(&gateway);
    store.load_settings().await.unwrap();

    let patch = SettingsPatch {
        selected_model: Some("claude".to_string()),
        max_context_window_size: Some(8192),
        ..SettingsPatch::default()
    };
    let settings = store.update_settings(patch).await.unwrap();
    assert_eq!(settings.selected_model, "claude");
    assert_eq!(settings.max_context_window_size, 8192);
    assert_eq!(settings.api_key, "sk-test");
    assert_eq!(store.read(|s| selectors::settings(s).cloned()), Some(settings.clone()));
    assert_eq!(gateway.settings(), Some(settings));
}

#[tokio::test]
async fn test_invalid_settings_patch_is_rejected() {
    let gateway = Arc::new(MockGateway::new().with_settings(fixtures::settings()));
    let store = fixtures::store(&gateway);
    store.load_settings().await.unwrap();

    let patch = SettingsPatch {
        max_context_window_size: Some(0),
        ..SettingsPatch::default()
    };
    let err = store.update_settings(patch).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(gateway.call_count(Endpoint::UpdateSettings), 0);
    assert_eq!(store.read(|s| selectors::settings(s).cloned()), Some(fixtures::settings()));
}

#[tokio::test]
async fn test_update_settings_failure_rolls_back() {
    let gateway = Arc::new(MockGateway::new().with_settings(fixtures::settings()));
    let store = fixtures::store(&gateway);
    store.load_settings().await.unwrap();
    gateway.fail_next(
        Endpoint::UpdateSettings,
        GatewayError::from_response(503, String::new()),
    );

    let patch = SettingsPatch {
        debug_mode: Some(true),
        ..SettingsPatch::default()
    };
    let err = store.update_settings(patch).await.unwrap_err();
    assert_eq!(err.message(), "HTTP 503");
    assert_eq!(store.read(|s| selectors::settings(s).cloned()), Some(fixtures::settings()));
}
