//! Teagarden Test Utilities
//!
//! Shared helpers for the client's integration tests: a scriptable
//! in-memory gateway, entity fixtures and proptest generators.

mod mock;

pub use mock::{Call, Endpoint, MockGateway};

// Re-export the crates tests always need alongside these helpers.
pub use teagarden_client;
pub use teagarden_core;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use proptest::prelude::*;
    use teagarden_core::*;

    pub fn arb_agent_role() -> impl Strategy<Value = AgentRole> {
        prop_oneof![
            Just(AgentRole::Admin),
            Just(AgentRole::Analyst),
            Just(AgentRole::Researcher),
            Just(AgentRole::Developer),
            Just(AgentRole::Writer),
            Just(AgentRole::FactChecker),
            Just(AgentRole::Unspecified),
        ]
    }

    pub fn arb_agent_status() -> impl Strategy<Value = AgentStatus> {
        prop_oneof![Just(AgentStatus::Active), Just(AgentStatus::Inactive)]
    }

    pub fn arb_agent_draft() -> impl Strategy<Value = AgentDraft> {
        (
            "[A-Z][a-z]{1,10}",
            "[a-z ]{0,24}",
            prop::collection::vec("[a-z]{2,8}", 0..4),
            arb_agent_role(),
            arb_agent_status(),
        )
            .prop_map(|(name, description, skills, role, status)| AgentDraft {
                name,
                description,
                skills,
                role,
                status,
                ..AgentDraft::default()
            })
    }

    /// Up to `max` agents with ids "1", "2", ... and dense positions.
    pub fn arb_agents(max: usize) -> impl Strategy<Value = Vec<Agent>> {
        prop::collection::vec(arb_agent_draft(), 0..=max).prop_map(|drafts| {
            drafts
                .iter()
                .enumerate()
                .map(|(i, draft)| draft.to_agent(AgentId::new((i + 1).to_string()), i))
                .collect()
        })
    }

    /// An agent list with a valid (from, to) move inside it.
    pub fn arb_agents_with_move(max: usize) -> impl Strategy<Value = (Vec<Agent>, usize, usize)> {
        arb_agents(max)
            .prop_filter("need at least one agent", |agents| !agents.is_empty())
            .prop_flat_map(|agents| {
                let len = agents.len();
                (Just(agents), 0..len, 0..len)
            })
    }

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Pending),
            Just(TaskStatus::InProgress),
            Just(TaskStatus::Done),
        ]
    }

    pub fn arb_task_priority() -> impl Strategy<Value = TaskPriority> {
        prop_oneof![
            Just(TaskPriority::Low),
            Just(TaskPriority::Medium),
            Just(TaskPriority::High),
        ]
    }

    pub fn arb_agent_patch() -> impl Strategy<Value = AgentPatch> {
        (
            prop::option::of("[A-Z][a-z]{1,10}"),
            prop::option::of("[a-z ]{0,24}"),
            prop::option::of(arb_agent_status()),
        )
            .prop_map(|(name, description, status)| AgentPatch {
                name,
                description,
                status,
                ..AgentPatch::default()
            })
    }

    pub fn arb_message_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 ?!.]{1,64}".prop_filter("must not be blank", |s| !s.trim().is_empty())
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use crate::MockGateway;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use teagarden_client::{AuthToken, MemoryTokenStorage, Store, StoreConfig};
    use teagarden_core::*;

    pub fn agent(id: &str, name: &str, position: usize) -> Agent {
        AgentDraft::named(name).to_agent(AgentId::from(id), position)
    }

    /// Alpha, Bravo and Charlie with ids "1", "2" and "3".
    pub fn three_agents() -> Vec<Agent> {
        vec![
            agent("1", "Alpha", 0),
            agent("2", "Bravo", 1),
            agent("3", "Charlie", 2),
        ]
    }

    pub fn task(id: &str, description: &str, agent_id: Option<&str>, position: usize) -> Task {
        let mut draft = TaskDraft::new(description);
        draft.agent_id = agent_id.map(AgentId::from);
        draft.to_task(TaskId::from(id), position)
    }

    pub fn user(id: &str, name: &str, email: &str) -> User {
        UserDraft::new(name, email).to_user(UserId::from(id))
    }

    pub fn admin(id: &str, name: &str, email: &str) -> User {
        User {
            role: UserRole::Admin,
            ..user(id, name, email)
        }
    }

    pub fn settings() -> SystemSettings {
        SystemSettings {
            selected_model: "gpt-4".to_string(),
            api_key: "sk-test".to_string(),
            max_context_window_size: 4096,
            logging_level: "info".to_string(),
            database_file_path: "/var/lib/teagarden/db.sqlite".to_string(),
            debug_mode: false,
            feature_enabled: true,
        }
    }

    pub fn node(id: &str, label: &str) -> GraphNode {
        GraphNode {
            id: NodeId::from(id),
            label: label.to_string(),
            group: None,
        }
    }

    /// Alpha, Bravo and Charlie nodes with Alpha linked to the others.
    pub fn graph() -> KnowledgeGraph {
        KnowledgeGraph {
            nodes: vec![node("n1", "Alpha"), node("n2", "Bravo"), node("n3", "Charlie")],
            links: vec![
                GraphEdge {
                    source: NodeId::from("n1"),
                    target: NodeId::from("n2"),
                    label: "knows".to_string(),
                },
                GraphEdge {
                    source: NodeId::from("n1"),
                    target: NodeId::from("n3"),
                    label: "knows".to_string(),
                },
            ],
        }
    }

    /// Unsigned token whose claims describe `user` and expire at `exp`.
    pub fn jwt_for(user: &User, exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = serde_json::json!({
            "sub": user.id,
            "email": user.email,
            "name": user.name,
            "role": user.role,
            "exp": exp,
        });
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.signature", header, payload)
    }

    /// Token for `user` valid for another hour.
    pub fn fresh_jwt(user: &User) -> String {
        jwt_for(user, (Utc::now() + Duration::hours(1)).timestamp())
    }

    pub fn store_config() -> StoreConfig {
        StoreConfig::new(3, 64)
    }

    pub fn store(gateway: &Arc<MockGateway>) -> Store {
        store_with_tokens(gateway, Arc::new(MemoryTokenStorage::new()))
    }

    pub fn store_with_tokens(gateway: &Arc<MockGateway>, tokens: Arc<MemoryTokenStorage>) -> Store {
        let gateway: Arc<dyn teagarden_client::Gateway> = gateway.clone();
        Store::new(gateway, tokens, store_config())
    }

    /// Store whose token storage already holds a valid token for `user`.
    pub fn store_logged_in_as(gateway: &Arc<MockGateway>, user: &User) -> Store {
        let tokens = Arc::new(MemoryTokenStorage::with_token(AuthToken::new(fresh_jwt(user))));
        let store = store_with_tokens(gateway, tokens);
        store.restore_session();
        store
    }
}
