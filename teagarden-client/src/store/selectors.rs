//! Pure read functions over [`DomainState`]. Use them through
//! [`Store::read`](super::Store::read).

use super::operation::{
    ErrorKey, OpKey, OperationKind, PendingOperation, RecordedError, SettledOperation,
};
use super::state::DomainState;
use teagarden_core::{
    Agent, AgentId, KnowledgeGraph, Message, SystemSettings, Task, TaskId, User,
};

/// Who a task is assigned to, as the UI should show it. A reference to an
/// agent that no longer exists resolves to `Unassigned`.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignee {
    Agent(Agent),
    Unassigned,
}

impl Assignee {
    pub fn name(&self) -> &str {
        match self {
            Assignee::Agent(agent) => &agent.name,
            Assignee::Unassigned => "Unassigned",
        }
    }

    pub fn is_unassigned(&self) -> bool {
        matches!(self, Assignee::Unassigned)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskView {
    pub task: Task,
    pub assignee: Assignee,
}

pub fn agents(state: &DomainState) -> &[Agent] {
    state.agents.as_slice()
}

pub fn agent<'a>(state: &'a DomainState, id: &AgentId) -> Option<&'a Agent> {
    state.agents.get(id)
}

/// Agents whose name, description, role or a skill contains `query`,
/// ignoring case. A blank query matches every agent.
pub fn filtered_agents<'a>(state: &'a DomainState, query: &str) -> Vec<&'a Agent> {
    let needle = query.trim().to_lowercase();
    state
        .agents
        .iter()
        .filter(|agent| {
            needle.is_empty()
                || agent.name.to_lowercase().contains(&needle)
                || agent.description.to_lowercase().contains(&needle)
                || agent.role.as_str().contains(&needle)
                || agent.skills.iter().any(|s| s.to_lowercase().contains(&needle))
        })
        .collect()
}

pub fn assignee(state: &DomainState, task: &Task) -> Assignee {
    task.agent_id
        .as_ref()
        .and_then(|id| state.agents.get(id))
        .map_or(Assignee::Unassigned, |agent| Assignee::Agent(agent.clone()))
}

pub fn task(state: &DomainState, id: &TaskId) -> Option<TaskView> {
    state.tasks.get(id).map(|task| TaskView {
        assignee: assignee(state, task),
        task: task.clone(),
    })
}

/// Tasks in display order with their assignee resolved.
pub fn task_views(state: &DomainState) -> Vec<TaskView> {
    state
        .tasks
        .iter()
        .map(|task| TaskView {
            assignee: assignee(state, task),
            task: task.clone(),
        })
        .collect()
}

/// Task views whose description, status, priority or assignee name
/// contains `query`, ignoring case. A blank query matches every task.
pub fn filtered_task_views(state: &DomainState, query: &str) -> Vec<TaskView> {
    let needle = query.trim().to_lowercase();
    task_views(state)
        .into_iter()
        .filter(|view| {
            needle.is_empty()
                || view.task.description.to_lowercase().contains(&needle)
                || view.task.status.as_str().contains(&needle)
                || view.task.priority.as_str().contains(&needle)
                || view.assignee.name().to_lowercase().contains(&needle)
        })
        .collect()
}

/// Tasks assigned to a live agent. Orphaned tasks belong to nobody.
pub fn tasks_for_agent<'a>(state: &'a DomainState, agent_id: &AgentId) -> Vec<&'a Task> {
    let agent_id = state.agents.resolve(agent_id);
    if !state.agents.contains(&agent_id) {
        return Vec::new();
    }
    state
        .tasks
        .iter()
        .filter(|task| {
            task.agent_id
                .as_ref()
                .is_some_and(|id| state.agents.resolve(id) == agent_id)
        })
        .collect()
}

pub fn users(state: &DomainState) -> &[User] {
    state.users.as_slice()
}

/// Users whose name, email or role contains `query`, ignoring case.
pub fn filtered_users<'a>(state: &'a DomainState, query: &str) -> Vec<&'a User> {
    let needle = query.trim().to_lowercase();
    state
        .users
        .iter()
        .filter(|user| {
            needle.is_empty()
                || user.name.to_lowercase().contains(&needle)
                || user.email.to_lowercase().contains(&needle)
                || user.role.as_str().contains(&needle)
        })
        .collect()
}

/// The logged-in user, preferring the loaded record over the one rebuilt
/// from token claims.
pub fn current_user(state: &DomainState) -> Option<&User> {
    let session_user = state.session.user.as_ref()?;
    if !state.session.is_logged_in() {
        return None;
    }
    state.users.get(&session_user.id).or(Some(session_user))
}

pub fn is_admin(state: &DomainState) -> bool {
    current_user(state).is_some_and(|user| user.role.is_admin())
}

pub fn thread<'a>(state: &'a DomainState, agent_id: &AgentId) -> &'a [Message] {
    let agent_id = state.agents.resolve(agent_id);
    state
        .threads
        .get(&agent_id)
        .map_or(&[][..], Vec::as_slice)
}

pub fn graph(state: &DomainState) -> &KnowledgeGraph {
    &state.graph
}

pub fn settings(state: &DomainState) -> Option<&SystemSettings> {
    state.settings.as_ref()
}

pub fn errors(state: &DomainState) -> Vec<&RecordedError> {
    state.ledger.errors().collect()
}

pub fn error<'a>(
    state: &'a DomainState,
    operation: OperationKind,
    target: OpKey,
) -> Option<&'a RecordedError> {
    state.ledger.error(&ErrorKey::new(operation, target))
}

pub fn pending_operations(state: &DomainState) -> Vec<&PendingOperation> {
    state.ledger.pending().collect()
}

/// Settled operations, oldest first.
pub fn history(state: &DomainState) -> Vec<&SettledOperation> {
    state.ledger.history().collect()
}
