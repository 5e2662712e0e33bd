//! Operation ledger: pending optimistic mutations, their pre-images, the
//! settled history and recorded errors.

use crate::error::StoreError;
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use teagarden_core::{
    Agent, AgentId, HasEntityId, MessageId, NodeId, SystemSettings, Task, TaskId, Timestamp,
    User, UserId,
};
use uuid::Uuid;

/// Identifier of one issued operation. UUIDv7, so ids sort by issue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum OperationKind {
    LoadAgents,
    AddAgent,
    UpdateAgent,
    TerminateAgent,
    ReorderAgents,
    StartAgent,
    StopAgent,
    LoadTasks,
    AddTask,
    UpdateTask,
    DeleteTask,
    ReorderTasks,
    LoadUsers,
    CreateUser,
    UpdateUser,
    DeleteUser,
    LoadThread,
    SendMessage,
    LoadGraph,
    AddGraphNode,
    LoadSettings,
    UpdateSettings,
    Login,
    Logout,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::LoadAgents => "load_agents",
            OperationKind::AddAgent => "add_agent",
            OperationKind::UpdateAgent => "update_agent",
            OperationKind::TerminateAgent => "terminate_agent",
            OperationKind::ReorderAgents => "reorder_agents",
            OperationKind::StartAgent => "start_agent",
            OperationKind::StopAgent => "stop_agent",
            OperationKind::LoadTasks => "load_tasks",
            OperationKind::AddTask => "add_task",
            OperationKind::UpdateTask => "update_task",
            OperationKind::DeleteTask => "delete_task",
            OperationKind::ReorderTasks => "reorder_tasks",
            OperationKind::LoadUsers => "load_users",
            OperationKind::CreateUser => "create_user",
            OperationKind::UpdateUser => "update_user",
            OperationKind::DeleteUser => "delete_user",
            OperationKind::LoadThread => "load_thread",
            OperationKind::SendMessage => "send_message",
            OperationKind::LoadGraph => "load_graph",
            OperationKind::AddGraphNode => "add_graph_node",
            OperationKind::LoadSettings => "load_settings",
            OperationKind::UpdateSettings => "update_settings",
            OperationKind::Login => "login",
            OperationKind::Logout => "logout",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an operation targets. Also the key operations serialize on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum OpKey {
    Agent(AgentId),
    Task(TaskId),
    User(UserId),
    Thread(AgentId),
    /// The agent collection as a whole: loads and reorders.
    Agents,
    Tasks,
    Users,
    Graph,
    Settings,
    Session,
}

impl fmt::Display for OpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKey::Agent(id) => write!(f, "agent:{}", id),
            OpKey::Task(id) => write!(f, "task:{}", id),
            OpKey::User(id) => write!(f, "user:{}", id),
            OpKey::Thread(id) => write!(f, "thread:{}", id),
            OpKey::Agents => f.write_str("agents"),
            OpKey::Tasks => f.write_str("tasks"),
            OpKey::Users => f.write_str("users"),
            OpKey::Graph => f.write_str("graph"),
            OpKey::Settings => f.write_str("settings"),
            OpKey::Session => f.write_str("session"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationPhase {
    Pending,
    Committed,
    RolledBack,
}

/// State of a collection entry before an optimistic change.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot<T: HasEntityId> {
    /// The entity did not exist; rollback removes it.
    Inserted(T::Id),
    /// The entity's fields before the change.
    Changed(T),
    /// The entity and the index it was removed from.
    Removed { entity: T, index: usize },
    /// Collection order before a move.
    Order(Vec<T::Id>),
}

/// Everything needed to undo one optimistic mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum PreImage {
    Agent(Snapshot<Agent>),
    Task(Snapshot<Task>),
    User(Snapshot<User>),
    Message {
        agent_id: AgentId,
        message_id: MessageId,
    },
    GraphNode(NodeId),
    Settings(SystemSettings),
}

impl PreImage {
    /// Whether this operation optimistically inserted the given agent.
    pub fn inserted_agent(&self, id: &AgentId) -> bool {
        matches!(self, PreImage::Agent(Snapshot::Inserted(inserted)) if inserted == id)
    }

    pub fn inserted_task(&self, id: &TaskId) -> bool {
        matches!(self, PreImage::Task(Snapshot::Inserted(inserted)) if inserted == id)
    }

    pub fn inserted_user(&self, id: &UserId) -> bool {
        matches!(self, PreImage::User(Snapshot::Inserted(inserted)) if inserted == id)
    }

    pub fn inserted_message(&self, id: &MessageId) -> bool {
        matches!(self, PreImage::Message { message_id, .. } if message_id == id)
    }

    pub fn inserted_node(&self, id: &NodeId) -> bool {
        matches!(self, PreImage::GraphNode(inserted) if inserted == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub target: OpKey,
    pub phase: OperationPhase,
    pub started_at: Timestamp,
    pub pre_image: PreImage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettledOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub target: OpKey,
    pub phase: OperationPhase,
    pub started_at: Timestamp,
    pub settled_at: Timestamp,
}

/// Errors are recorded per operation kind and target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ErrorKey {
    pub operation: OperationKind,
    pub target: OpKey,
}

impl ErrorKey {
    pub fn new(operation: OperationKind, target: OpKey) -> Self {
        Self { operation, target }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    pub key: ErrorKey,
    pub error: StoreError,
    pub recorded_at: Timestamp,
}

/// Pending operations, bounded settled history and recorded errors.
#[derive(Debug, Clone)]
pub struct Ledger {
    pending: BTreeMap<OperationId, PendingOperation>,
    history: VecDeque<SettledOperation>,
    errors: BTreeMap<ErrorKey, RecordedError>,
    history_limit: usize,
}

impl Ledger {
    pub fn new(history_limit: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            history: VecDeque::new(),
            errors: BTreeMap::new(),
            history_limit,
        }
    }

    pub fn begin(&mut self, kind: OperationKind, target: OpKey, pre_image: PreImage) -> OperationId {
        let id = OperationId::new();
        self.pending.insert(
            id,
            PendingOperation {
                id,
                kind,
                target,
                phase: OperationPhase::Pending,
                started_at: Utc::now(),
                pre_image,
            },
        );
        id
    }

    /// Move a pending operation to history. Returns it with its final phase.
    pub fn settle(&mut self, id: OperationId, phase: OperationPhase) -> Option<PendingOperation> {
        let mut op = self.pending.remove(&id)?;
        op.phase = phase;
        self.history.push_back(SettledOperation {
            id: op.id,
            kind: op.kind,
            target: op.target.clone(),
            phase,
            started_at: op.started_at,
            settled_at: Utc::now(),
        });
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
        Some(op)
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingOperation> {
        self.pending.values()
    }

    pub fn is_pending(&self, id: OperationId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn any_pending(&self, mut predicate: impl FnMut(&PendingOperation) -> bool) -> bool {
        self.pending.values().any(|op| predicate(op))
    }

    pub fn history(&self) -> impl Iterator<Item = &SettledOperation> {
        self.history.iter()
    }

    pub fn record_error(&mut self, key: ErrorKey, error: StoreError) {
        self.errors.insert(
            key.clone(),
            RecordedError {
                key,
                error,
                recorded_at: Utc::now(),
            },
        );
    }

    pub fn clear_error(&mut self, key: &ErrorKey) -> Option<RecordedError> {
        self.errors.remove(key)
    }

    pub fn clear_all_errors(&mut self) {
        self.errors.clear();
    }

    pub fn error(&self, key: &ErrorKey) -> Option<&RecordedError> {
        self.errors.get(key)
    }

    pub fn errors(&self) -> impl Iterator<Item = &RecordedError> {
        self.errors.values()
    }
}
