//! RestGateway against a local HTTP mock: paths, bodies, auth header and
//! response decoding.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use teagarden_client::gateway::LoginRequest;
use teagarden_client::{
    Created, ErrorKind, Gateway, GatewayErrorKind, MemoryTokenStorage, RestGateway, Store,
};
use teagarden_core::*;
use teagarden_test_utils::fixtures;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> RestGateway {
    RestGateway::with_base_url(&format!("{}/api/", server.uri()), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_list_agents_sends_bearer_and_accepts_numeric_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/agents"))
        .and(header("authorization", "Bearer abc.def.ghi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "Alpha", "status": "active", "position": 0 },
            { "id": "2", "name": "Bravo", "role": "fact-checker" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let gw = gateway(&server);
    gw.set_bearer_token(Some("abc.def.ghi".to_string()));
    let agents = gw.list_agents().await.unwrap();

    assert_eq!(agents[0].id, AgentId::from("1"));
    assert_eq!(agents[0].status, AgentStatus::Active);
    assert_eq!(agents[1].role, AgentRole::FactChecker);
    assert_eq!(agents[1].status, AgentStatus::Inactive);
}

#[tokio::test]
async fn test_create_accepts_acknowledgement() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .and(body_json(json!({
            "description": "Collect sources",
            "agentId": "1",
            "status": "pending",
            "priority": "medium"
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "message": "Task created", "id": 7 })),
        )
        .mount(&server)
        .await;

    let draft = TaskDraft::new("Collect sources").assigned_to(AgentId::from("1"));
    let created = gateway(&server).create_task(&draft).await.unwrap();
    assert_eq!(created, Created::Acknowledged(TaskId::from("7")));
}

#[tokio::test]
async fn test_update_with_empty_body_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/agents/3"))
        .and(body_json(json!({ "status": "active" })))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let updated = gateway(&server)
        .update_agent(&AgentId::from("3"), &AgentPatch::status(AgentStatus::Active))
        .await
        .unwrap();
    assert_eq!(updated, None);
}

#[tokio::test]
async fn test_reorder_posts_id_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/agents/reorder"))
        .and(body_json(json!({ "ids": ["2", "3", "1"] })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let ids = [AgentId::from("2"), AgentId::from("3"), AgentId::from("1")];
    gateway(&server).reorder_agents(&ids).await.unwrap();
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Token expired" })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/tasks/9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let gw = gateway(&server);
    let err = gw.list_users().await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Unauthorized);
    assert_eq!(err.message, "Token expired");
    assert_eq!(err.status, Some(401));

    let err = gw.delete_task(&TaskId::from("9")).await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::NotFound);
    assert_eq!(err.message, "HTTP 404");
}

#[tokio::test]
async fn test_malformed_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/knowledge-graph"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = gateway(&server).fetch_graph().await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Server);
    assert!(err.message.starts_with("Malformed payload"));
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let gw = RestGateway::with_base_url("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    let err = gw.list_agents().await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Network);
}

#[tokio::test]
async fn test_login_and_settings_paths() {
    let server = MockServer::start().await;
    let ada = fixtures::admin("u1", "Ada", "ada@example.com");
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({ "email": "ada@example.com", "password": "pw" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "t.o.k",
            "user": { "id": "u1", "name": "Ada", "email": "ada@example.com", "role": "admin" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/system_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "selected_model": "gpt-4",
            "api_key": "sk",
            "max_context_window_size": 2048,
            "logging_level": "debug",
            "database_file_path": "/tmp/db",
            "debug_mode": true,
            "feature_enabled": false
        })))
        .mount(&server)
        .await;

    let gw = gateway(&server);
    let response = gw
        .login(&LoginRequest {
            email: "ada@example.com".to_string(),
            password: "pw".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(response.token, "t.o.k");
    assert_eq!(response.user, ada);

    let settings = gw.fetch_settings().await.unwrap();
    assert_eq!(settings.max_context_window_size, 2048);
    assert!(settings.debug_mode);
}

#[tokio::test]
async fn test_store_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "Alpha", "position": 0 }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agents"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 2 })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agents/2/start"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "No capacity" })))
        .mount(&server)
        .await;

    let store = Store::new(
        Arc::new(gateway(&server)),
        Arc::new(MemoryTokenStorage::new()),
        fixtures::store_config(),
    );
    store.load_agents().await.unwrap();
    let added = store.add_agent(AgentDraft::named("Bravo")).await.unwrap();
    assert_eq!(added.id, AgentId::from("2"));
    assert_eq!(added.position, 1);

    let err = store.start_agent(&added.id).await.unwrap_err();
    assert_eq!(err.message(), "No capacity");
    assert_eq!(
        store.read(|s| s.agents.get(&added.id).map(|a| a.status)),
        Some(AgentStatus::Inactive)
    );
}

fn http_store(server: &MockServer) -> Store {
    Store::new(
        Arc::new(gateway(server)),
        Arc::new(MemoryTokenStorage::new()),
        fixtures::store_config(),
    )
}

#[tokio::test]
async fn test_confirmed_agent_without_name_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "1", "name": "Alpha", "position": 0 }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/agents/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1", "name": "" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agents"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "2", "name": " " })))
        .mount(&server)
        .await;

    let store = http_store(&server);
    store.load_agents().await.unwrap();
    let before = store.read(|s| s.agents.as_slice().to_vec());

    let err = store
        .update_agent(&AgentId::from("1"), AgentPatch::status(AgentStatus::Active))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServerError);
    assert!(err.message().starts_with("Malformed payload"));
    assert_eq!(store.read(|s| s.agents.as_slice().to_vec()), before);

    assert!(store.add_agent(AgentDraft::named("Bravo")).await.is_err());
    store.read(|s| {
        assert_eq!(s.agents.as_slice(), before.as_slice());
        assert!(s.ledger.pending().next().is_none());
        assert_eq!(s.ledger.errors().count(), 2);
    });
}

#[tokio::test]
async fn test_confirmed_user_cannot_take_another_email() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "u1", "name": "Ann", "email": "a@x.io" },
            { "id": "u2", "name": "Bea", "email": "b@x.io" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/users/u2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u2", "name": "Bea Smith", "email": "A@X.IO"
        })))
        .mount(&server)
        .await;

    let store = http_store(&server);
    store.load_users().await.unwrap();

    let patch = UserPatch {
        name: Some("Bea Smith".to_string()),
        ..UserPatch::default()
    };
    let err = store.update_user(&UserId::from("u2"), patch).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServerError);

    let emails: Vec<String> = store.read(|s| s.users.iter().map(|u| u.email.clone()).collect());
    assert_eq!(emails, ["a@x.io", "b@x.io"]);
    assert_eq!(
        store.read(|s| s.users.get(&UserId::from("u2")).map(|u| u.name.clone())),
        Some("Bea".to_string())
    );
}

#[tokio::test]
async fn test_confirmed_settings_are_validated() {
    let server = MockServer::start().await;
    let loaded = json!({
        "selectedModel": "gpt-4",
        "maxContextWindowSize": 4096,
        "loggingLevel": "info"
    });
    Mock::given(method("GET"))
        .and(path("/api/system_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(loaded))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/system_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "selectedModel": "gpt-4",
            "maxContextWindowSize": 0,
            "loggingLevel": "debug"
        })))
        .mount(&server)
        .await;

    let store = http_store(&server);
    store.load_settings().await.unwrap();
    let before = store.read(|s| s.settings.clone());

    let patch = SettingsPatch {
        logging_level: Some("debug".to_string()),
        ..SettingsPatch::default()
    };
    let err = store.update_settings(patch).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServerError);
    assert_eq!(store.read(|s| s.settings.clone()), before);
}
