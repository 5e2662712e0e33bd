//! In-memory backend implementing the gateway trait.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};
use teagarden_client::gateway::{
    Created, Gateway, GatewayError, GatewayErrorKind, GatewayResult, LoginRequest, LoginResponse,
};
use teagarden_core::{
    Agent, AgentDraft, AgentId, AgentPatch, AgentStatus, EntityIdType, GraphNode, GraphNodeDraft,
    KnowledgeGraph, Message, MessageDraft, MessageId, NodeId, SettingsPatch, SystemSettings, Task,
    TaskDraft, TaskId, TaskPatch, User, UserDraft, UserId, UserPatch,
};
use tokio::sync::oneshot;

/// Gateway method, used to script failures and pauses and to inspect calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListAgents,
    CreateAgent,
    UpdateAgent,
    DeleteAgent,
    ReorderAgents,
    StartAgent,
    StopAgent,
    ListTasks,
    CreateTask,
    UpdateTask,
    DeleteTask,
    ReorderTasks,
    ListUsers,
    CreateUser,
    UpdateUser,
    DeleteUser,
    ListMessages,
    PostMessage,
    FetchGraph,
    AddGraphNode,
    FetchSettings,
    UpdateSettings,
    Login,
    Logout,
}

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub endpoint: Endpoint,
    /// Path id, when the endpoint has one.
    pub target: Option<String>,
    /// Request body as it would be sent.
    pub body: Value,
}

struct Account {
    password: String,
    user: User,
    token: String,
}

#[derive(Default)]
struct Backend {
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    users: Vec<User>,
    messages: HashMap<AgentId, Vec<Message>>,
    graph: KnowledgeGraph,
    settings: Option<SystemSettings>,
    accounts: HashMap<String, Account>,
    next_id: u64,
}

impl Backend {
    /// Server ids start at 101 so they never collide with fixture ids.
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        (100 + self.next_id).to_string()
    }
}

fn not_found(kind: &str, id: impl std::fmt::Display) -> GatewayError {
    GatewayError::from_response(404, format!(r#"{{"error":"{} {} not found"}}"#, kind, id))
}

fn renumber<T>(items: &mut [T], set: impl Fn(&mut T, usize)) {
    for (i, item) in items.iter_mut().enumerate() {
        set(item, i);
    }
}

fn reorder<T: Clone, I: PartialEq>(items: &mut Vec<T>, ids: &[I], id_of: impl Fn(&T) -> &I) {
    let mut ordered: Vec<T> = ids
        .iter()
        .filter_map(|id| items.iter().find(|item| id_of(item) == id).cloned())
        .collect();
    for item in items.iter() {
        if !ids.contains(id_of(item)) {
            ordered.push(item.clone());
        }
    }
    *items = ordered;
}

/// Scriptable in-memory backend.
///
/// Every call is recorded. [`MockGateway::fail_next`] makes the next call
/// to an endpoint fail; [`MockGateway::pause_next`] holds the next call
/// until the returned sender fires or is dropped.
#[derive(Default)]
pub struct MockGateway {
    backend: RwLock<Backend>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<Endpoint, VecDeque<GatewayError>>>,
    pauses: Mutex<HashMap<Endpoint, VecDeque<oneshot::Receiver<()>>>>,
    bearer: Mutex<Option<String>>,
    acknowledge_only: Mutex<bool>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agents(self, agents: Vec<Agent>) -> Self {
        self.backend.write().unwrap().agents = agents;
        self
    }

    pub fn with_tasks(self, tasks: Vec<Task>) -> Self {
        self.backend.write().unwrap().tasks = tasks;
        self
    }

    pub fn with_users(self, users: Vec<User>) -> Self {
        self.backend.write().unwrap().users = users;
        self
    }

    pub fn with_messages(self, agent_id: AgentId, messages: Vec<Message>) -> Self {
        self.backend.write().unwrap().messages.insert(agent_id, messages);
        self
    }

    pub fn with_graph(self, graph: KnowledgeGraph) -> Self {
        self.backend.write().unwrap().graph = graph;
        self
    }

    pub fn with_settings(self, settings: SystemSettings) -> Self {
        self.backend.write().unwrap().settings = Some(settings);
        self
    }

    /// Accept `email`/`password` and answer with `user` and `token`.
    pub fn with_account(self, email: &str, password: &str, user: User, token: &str) -> Self {
        self.backend.write().unwrap().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user,
                token: token.to_string(),
            },
        );
        self
    }

    /// Answer creates with only the new id instead of the full record.
    pub fn acknowledge_creates(&self, enabled: bool) {
        *self.acknowledge_only.lock().unwrap() = enabled;
    }

    /// Fail the next call to `endpoint` with `error`. Failures queue up.
    pub fn fail_next(&self, endpoint: Endpoint, error: GatewayError) {
        self.failures
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Hold the next call to `endpoint` until the returned sender fires.
    pub fn pause_next(&self, endpoint: Endpoint) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.pauses
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.endpoint == endpoint)
            .collect()
    }

    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.calls_to(endpoint).len()
    }

    /// Yield until `endpoint` has been called `count` times.
    pub async fn wait_for(&self, endpoint: Endpoint, count: usize) {
        while self.call_count(endpoint) < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.bearer.lock().unwrap().clone()
    }

    pub fn agents(&self) -> Vec<Agent> {
        self.backend.read().unwrap().agents.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.backend.read().unwrap().tasks.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.backend.read().unwrap().users.clone()
    }

    pub fn settings(&self) -> Option<SystemSettings> {
        self.backend.read().unwrap().settings.clone()
    }

    pub fn messages(&self, agent_id: &AgentId) -> Vec<Message> {
        let backend = self.backend.read().unwrap();
        backend.messages.get(agent_id).cloned().unwrap_or_default()
    }

    /// Record the call, honour a scripted pause, then a scripted failure.
    async fn enter(
        &self,
        endpoint: Endpoint,
        target: Option<String>,
        body: impl Serialize,
    ) -> GatewayResult<()> {
        self.calls.lock().unwrap().push(Call {
            endpoint,
            target,
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        });
        let pause = self
            .pauses
            .lock()
            .unwrap()
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front);
        if let Some(release) = pause {
            let _ = release.await;
        }
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn acknowledge<T: teagarden_core::HasEntityId>(&self, entity: T) -> Created<T> {
        if *self.acknowledge_only.lock().unwrap() {
            Created::Acknowledged(entity.entity_id().clone())
        } else {
            Created::Entity(entity)
        }
    }

    fn set_agent_status(&self, id: &AgentId, status: AgentStatus) -> GatewayResult<Option<Agent>> {
        let mut backend = self.backend.write().unwrap();
        let agent = backend
            .agents
            .iter_mut()
            .find(|a| &a.id == id)
            .ok_or_else(|| not_found("Agent", id))?;
        agent.status = status;
        Ok(Some(agent.clone()))
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn set_bearer_token(&self, token: Option<String>) {
        *self.bearer.lock().unwrap() = token;
    }

    async fn list_agents(&self) -> GatewayResult<Vec<Agent>> {
        self.enter(Endpoint::ListAgents, None, ()).await?;
        Ok(self.agents())
    }

    async fn create_agent(&self, draft: &AgentDraft) -> GatewayResult<Created<Agent>> {
        self.enter(Endpoint::CreateAgent, None, draft).await?;
        let agent = {
            let mut backend = self.backend.write().unwrap();
            let id = AgentId::new(backend.next_id());
            let agent = draft.to_agent(id, backend.agents.len());
            backend.agents.push(agent.clone());
            agent
        };
        Ok(self.acknowledge(agent))
    }

    async fn update_agent(&self, id: &AgentId, patch: &AgentPatch) -> GatewayResult<Option<Agent>> {
        self.enter(Endpoint::UpdateAgent, Some(id.to_string()), patch)
            .await?;
        let mut backend = self.backend.write().unwrap();
        let agent = backend
            .agents
            .iter_mut()
            .find(|a| &a.id == id)
            .ok_or_else(|| not_found("Agent", id))?;
        agent.apply_patch(patch);
        Ok(Some(agent.clone()))
    }

    async fn delete_agent(&self, id: &AgentId) -> GatewayResult<()> {
        self.enter(Endpoint::DeleteAgent, Some(id.to_string()), ())
            .await?;
        let mut backend = self.backend.write().unwrap();
        let index = backend
            .agents
            .iter()
            .position(|a| &a.id == id)
            .ok_or_else(|| not_found("Agent", id))?;
        backend.agents.remove(index);
        renumber(&mut backend.agents, |a, i| a.position = i);
        Ok(())
    }

    async fn reorder_agents(&self, ids: &[AgentId]) -> GatewayResult<()> {
        self.enter(Endpoint::ReorderAgents, None, serde_json::json!({ "ids": ids }))
            .await?;
        let mut backend = self.backend.write().unwrap();
        reorder(&mut backend.agents, ids, |a| &a.id);
        renumber(&mut backend.agents, |a, i| a.position = i);
        Ok(())
    }

    async fn start_agent(&self, id: &AgentId) -> GatewayResult<Option<Agent>> {
        self.enter(Endpoint::StartAgent, Some(id.to_string()), ())
            .await?;
        self.set_agent_status(id, AgentStatus::Active)
    }

    async fn stop_agent(&self, id: &AgentId) -> GatewayResult<Option<Agent>> {
        self.enter(Endpoint::StopAgent, Some(id.to_string()), ())
            .await?;
        self.set_agent_status(id, AgentStatus::Inactive)
    }

    async fn list_tasks(&self) -> GatewayResult<Vec<Task>> {
        self.enter(Endpoint::ListTasks, None, ()).await?;
        Ok(self.tasks())
    }

    async fn create_task(&self, draft: &TaskDraft) -> GatewayResult<Created<Task>> {
        self.enter(Endpoint::CreateTask, None, draft).await?;
        let task = {
            let mut backend = self.backend.write().unwrap();
            let id = TaskId::new(backend.next_id());
            let mut task = draft.to_task(id, backend.tasks.len());
            task.created_at = Some(Utc::now());
            backend.tasks.push(task.clone());
            task
        };
        Ok(self.acknowledge(task))
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> GatewayResult<Option<Task>> {
        self.enter(Endpoint::UpdateTask, Some(id.to_string()), patch)
            .await?;
        let mut backend = self.backend.write().unwrap();
        let task = backend
            .tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| not_found("Task", id))?;
        task.apply_patch(patch);
        Ok(Some(task.clone()))
    }

    async fn delete_task(&self, id: &TaskId) -> GatewayResult<()> {
        self.enter(Endpoint::DeleteTask, Some(id.to_string()), ())
            .await?;
        let mut backend = self.backend.write().unwrap();
        let index = backend
            .tasks
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| not_found("Task", id))?;
        backend.tasks.remove(index);
        renumber(&mut backend.tasks, |t, i| t.position = i);
        Ok(())
    }

    async fn reorder_tasks(&self, ids: &[TaskId]) -> GatewayResult<()> {
        self.enter(Endpoint::ReorderTasks, None, serde_json::json!({ "ids": ids }))
            .await?;
        let mut backend = self.backend.write().unwrap();
        reorder(&mut backend.tasks, ids, |t| &t.id);
        renumber(&mut backend.tasks, |t, i| t.position = i);
        Ok(())
    }

    async fn list_users(&self) -> GatewayResult<Vec<User>> {
        self.enter(Endpoint::ListUsers, None, ()).await?;
        Ok(self.users())
    }

    async fn create_user(&self, draft: &UserDraft) -> GatewayResult<Created<User>> {
        self.enter(Endpoint::CreateUser, None, draft).await?;
        let user = {
            let mut backend = self.backend.write().unwrap();
            if backend
                .users
                .iter()
                .any(|u| u.email.eq_ignore_ascii_case(&draft.email))
            {
                return Err(GatewayError::from_response(
                    409,
                    r#"{"error":"Email already registered"}"#.to_string(),
                ));
            }
            let id = UserId::new(backend.next_id());
            let user = draft.to_user(id);
            backend.users.push(user.clone());
            user
        };
        Ok(self.acknowledge(user))
    }

    async fn update_user(&self, id: &UserId, patch: &UserPatch) -> GatewayResult<Option<User>> {
        self.enter(Endpoint::UpdateUser, Some(id.to_string()), patch)
            .await?;
        let mut backend = self.backend.write().unwrap();
        let user = backend
            .users
            .iter_mut()
            .find(|u| &u.id == id)
            .ok_or_else(|| not_found("User", id))?;
        user.apply_patch(patch);
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: &UserId) -> GatewayResult<()> {
        self.enter(Endpoint::DeleteUser, Some(id.to_string()), ())
            .await?;
        let mut backend = self.backend.write().unwrap();
        let before = backend.users.len();
        backend.users.retain(|u| &u.id != id);
        if backend.users.len() == before {
            return Err(not_found("User", id));
        }
        Ok(())
    }

    async fn list_messages(&self, agent_id: &AgentId) -> GatewayResult<Vec<Message>> {
        self.enter(Endpoint::ListMessages, Some(agent_id.to_string()), ())
            .await?;
        Ok(self.messages(agent_id))
    }

    async fn post_message(&self, agent_id: &AgentId, draft: &MessageDraft) -> GatewayResult<Message> {
        self.enter(Endpoint::PostMessage, Some(agent_id.to_string()), draft)
            .await?;
        let mut backend = self.backend.write().unwrap();
        let message = Message {
            id: MessageId::new(backend.next_id()),
            agent_id: agent_id.clone(),
            text: draft.text.clone(),
            sender: draft.sender,
            timestamp: Utc::now(),
        };
        backend
            .messages
            .entry(agent_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn fetch_graph(&self) -> GatewayResult<KnowledgeGraph> {
        self.enter(Endpoint::FetchGraph, None, ()).await?;
        Ok(self.backend.read().unwrap().graph.clone())
    }

    async fn add_graph_node(&self, draft: &GraphNodeDraft) -> GatewayResult<Created<GraphNode>> {
        self.enter(Endpoint::AddGraphNode, None, draft).await?;
        let node = {
            let mut backend = self.backend.write().unwrap();
            let node = draft.to_node(NodeId::new(backend.next_id()));
            backend.graph.nodes.push(node.clone());
            node
        };
        Ok(self.acknowledge(node))
    }

    async fn fetch_settings(&self) -> GatewayResult<SystemSettings> {
        self.enter(Endpoint::FetchSettings, None, ()).await?;
        self.settings().ok_or_else(|| not_found("Settings", "system"))
    }

    async fn update_settings(&self, patch: &SettingsPatch) -> GatewayResult<Option<SystemSettings>> {
        self.enter(Endpoint::UpdateSettings, None, patch).await?;
        let mut backend = self.backend.write().unwrap();
        let settings = backend
            .settings
            .as_mut()
            .ok_or_else(|| not_found("Settings", "system"))?;
        settings.apply_patch(patch);
        Ok(Some(settings.clone()))
    }

    async fn login(&self, request: &LoginRequest) -> GatewayResult<LoginResponse> {
        self.enter(
            Endpoint::Login,
            None,
            serde_json::json!({ "email": request.email }),
        )
        .await?;
        let backend = self.backend.read().unwrap();
        match backend.accounts.get(&request.email) {
            Some(account) if account.password == request.password => Ok(LoginResponse {
                token: account.token.clone(),
                user: account.user.clone(),
            }),
            _ => Err(GatewayError::new(
                GatewayErrorKind::Unauthorized,
                "Invalid credentials",
            )),
        }
    }

    async fn logout(&self) -> GatewayResult<()> {
        self.enter(Endpoint::Logout, None, ()).await
    }
}
