//! Core entity structures, creation drafts and partial-update patches

use crate::{
    error::{require_non_empty, ValidationError, ValidationResult},
    AgentId, AgentRole, AgentStatus, EntityIdType, EntityKind, MessageId, MessageSender, TaskId,
    TaskPriority, TaskStatus, Timestamp, UserId, UserRole,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// An entity addressable by a typed id.
pub trait HasEntityId {
    type Id: EntityIdType;

    const KIND: EntityKind;

    fn entity_id(&self) -> &Self::Id;

    fn set_entity_id(&mut self, id: Self::Id);
}

/// An entity with a manual ordering rank.
pub trait Ranked: HasEntityId {
    fn position(&self) -> usize;

    fn set_position(&mut self, position: usize);
}

fn changed<T: PartialEq + Clone>(before: &T, after: &T) -> Option<T> {
    if before == after {
        None
    } else {
        Some(after.clone())
    }
}

// ============================================================================
// AGENT
// ============================================================================

/// Agent - a named worker with skills, a role and tool access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub role: AgentRole,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub permissions: BTreeMap<String, bool>,
    #[serde(default)]
    pub tools: BTreeSet<String>,
    #[serde(default)]
    pub position: usize,
}

impl Agent {
    /// Validate a record received from the server.
    pub fn validate(&self) -> ValidationResult<()> {
        require_non_empty("id", self.id.as_str())?;
        require_non_empty("name", &self.name)
    }

    /// Shallow merge of the patch's present fields.
    pub fn apply_patch(&mut self, patch: &AgentPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(skills) = &patch.skills {
            self.skills = skills.clone();
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(permissions) = &patch.permissions {
            self.permissions = permissions.clone();
        }
        if let Some(tools) = &patch.tools {
            self.tools = tools.clone();
        }
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.get(name).copied().unwrap_or(false)
    }
}

impl HasEntityId for Agent {
    type Id = AgentId;

    const KIND: EntityKind = EntityKind::Agent;

    fn entity_id(&self) -> &AgentId {
        &self.id
    }

    fn set_entity_id(&mut self, id: AgentId) {
        self.id = id;
    }
}

impl Ranked for Agent {
    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

/// Fields for creating an agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDraft {
    pub name: String,
    pub description: String,
    pub skills: Vec<String>,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub permissions: BTreeMap<String, bool>,
    pub tools: BTreeSet<String>,
}

impl AgentDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        require_non_empty("name", &self.name)
    }

    /// Materialize the draft as an agent with the given id and rank.
    pub fn to_agent(&self, id: AgentId, position: usize) -> Agent {
        Agent {
            id,
            name: self.name.clone(),
            description: self.description.clone(),
            skills: self.skills.clone(),
            role: self.role,
            status: self.status,
            permissions: self.permissions.clone(),
            tools: self.tools.clone(),
            position,
        }
    }
}

/// Partial update for an agent. Absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<AgentRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<BTreeSet<String>>,
}

impl AgentPatch {
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// The patch that turns `before` into `after`.
    pub fn between(before: &Agent, after: &Agent) -> Self {
        Self {
            name: changed(&before.name, &after.name),
            description: changed(&before.description, &after.description),
            skills: changed(&before.skills, &after.skills),
            role: changed(&before.role, &after.role),
            status: changed(&before.status, &after.status),
            permissions: changed(&before.permissions, &after.permissions),
            tools: changed(&before.tools, &after.tools),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        Ok(())
    }
}

// ============================================================================
// TASK
// ============================================================================

/// Task - a unit of work, optionally assigned to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl Task {
    pub fn validate(&self) -> ValidationResult<()> {
        require_non_empty("id", self.id.as_str())?;
        require_non_empty("description", &self.description)
    }

    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(agent_id) = &patch.agent_id {
            self.agent_id = agent_id.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
    }
}

impl HasEntityId for Task {
    type Id = TaskId;

    const KIND: EntityKind = EntityKind::Task;

    fn entity_id(&self) -> &TaskId {
        &self.id
    }

    fn set_entity_id(&mut self, id: TaskId) {
        self.id = id;
    }
}

impl Ranked for Task {
    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

/// Fields for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub description: String,
    pub agent_id: Option<AgentId>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
}

impl TaskDraft {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn assigned_to(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        require_non_empty("description", &self.description)
    }

    pub fn to_task(&self, id: TaskId, position: usize) -> Task {
        Task {
            id,
            description: self.description.clone(),
            agent_id: self.agent_id.clone(),
            status: self.status,
            priority: self.priority,
            position,
            created_at: None,
        }
    }
}

/// Partial update for a task. `agent_id: Some(None)` unassigns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Option<AgentId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
}

impl TaskPatch {
    pub fn between(before: &Task, after: &Task) -> Self {
        Self {
            description: changed(&before.description, &after.description),
            agent_id: changed(&before.agent_id, &after.agent_id),
            status: changed(&before.status, &after.status),
            priority: changed(&before.priority, &after.priority),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(description) = &self.description {
            require_non_empty("description", description)?;
        }
        Ok(())
    }
}

// ============================================================================
// USER
// ============================================================================

/// User account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

impl User {
    pub fn validate(&self) -> ValidationResult<()> {
        require_non_empty("id", self.id.as_str())?;
        require_non_empty("name", &self.name)?;
        validate_email(&self.email)
    }

    pub fn apply_patch(&mut self, patch: &UserPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(profile_picture) = &patch.profile_picture {
            self.profile_picture = profile_picture.clone();
        }
    }
}

impl HasEntityId for User {
    type Id = UserId;

    const KIND: EntityKind = EntityKind::User;

    fn entity_id(&self) -> &UserId {
        &self.id
    }

    fn set_entity_id(&mut self, id: UserId) {
        self.id = id;
    }
}

/// Check that an email is present and plausibly shaped.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    require_non_empty("email", email)?;
    if !email.contains('@') {
        return Err(ValidationError::InvalidValue {
            field: "email",
            reason: "must contain '@'".to_string(),
        });
    }
    Ok(())
}

/// Fields for creating a user.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UserDraft {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        require_non_empty("name", &self.name)?;
        validate_email(&self.email)
    }

    pub fn to_user(&self, id: UserId) -> User {
        User {
            id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            profile_picture: None,
        }
    }
}

impl fmt::Debug for UserDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDraft")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Partial update for a user. `profile_picture: Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<Option<String>>,
}

impl UserPatch {
    pub fn between(before: &User, after: &User) -> Self {
        Self {
            name: changed(&before.name, &after.name),
            email: changed(&before.email, &after.email),
            role: changed(&before.role, &after.role),
            profile_picture: changed(&before.profile_picture, &after.profile_picture),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        Ok(())
    }
}

// ============================================================================
// MESSAGE
// ============================================================================

/// Message in an agent's conversation thread. Messages are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub agent_id: AgentId,
    pub text: String,
    #[serde(default)]
    pub sender: MessageSender,
    pub timestamp: Timestamp,
}

/// Fields for posting a message to a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub text: String,
    pub sender: MessageSender,
}

impl MessageDraft {
    pub fn from_user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: MessageSender::User,
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        require_non_empty("text", &self.text)
    }
}

// ============================================================================
// SYSTEM SETTINGS
// ============================================================================

/// Administration settings. Accepts both camelCase and snake_case keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    #[serde(alias = "selected_model")]
    pub selected_model: String,
    #[serde(default, alias = "api_key")]
    pub api_key: String,
    #[serde(alias = "max_context_window_size")]
    pub max_context_window_size: u32,
    #[serde(alias = "logging_level")]
    pub logging_level: String,
    #[serde(default, alias = "database_file_path")]
    pub database_file_path: String,
    #[serde(default, alias = "debug_mode")]
    pub debug_mode: bool,
    #[serde(default, alias = "feature_enabled")]
    pub feature_enabled: bool,
}

impl SystemSettings {
    pub fn validate(&self) -> ValidationResult<()> {
        require_non_empty("selectedModel", &self.selected_model)?;
        require_non_empty("loggingLevel", &self.logging_level)?;
        if self.max_context_window_size == 0 {
            return Err(ValidationError::InvalidValue {
                field: "maxContextWindowSize",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn apply_patch(&mut self, patch: &SettingsPatch) {
        if let Some(v) = &patch.selected_model {
            self.selected_model = v.clone();
        }
        if let Some(v) = &patch.api_key {
            self.api_key = v.clone();
        }
        if let Some(v) = patch.max_context_window_size {
            self.max_context_window_size = v;
        }
        if let Some(v) = &patch.logging_level {
            self.logging_level = v.clone();
        }
        if let Some(v) = &patch.database_file_path {
            self.database_file_path = v.clone();
        }
        if let Some(v) = patch.debug_mode {
            self.debug_mode = v;
        }
        if let Some(v) = patch.feature_enabled {
            self.feature_enabled = v;
        }
    }
}

/// Partial update for the administration settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_window_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_enabled: Option<bool>,
}

impl SettingsPatch {
    pub fn between(before: &SystemSettings, after: &SystemSettings) -> Self {
        Self {
            selected_model: changed(&before.selected_model, &after.selected_model),
            api_key: changed(&before.api_key, &after.api_key),
            max_context_window_size: changed(
                &before.max_context_window_size,
                &after.max_context_window_size,
            ),
            logging_level: changed(&before.logging_level, &after.logging_level),
            database_file_path: changed(&before.database_file_path, &after.database_file_path),
            debug_mode: changed(&before.debug_mode, &after.debug_mode),
            feature_enabled: changed(&before.feature_enabled, &after.feature_enabled),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn scout() -> Agent {
        AgentDraft::named("Scout").to_agent(AgentId::from("1"), 0)
    }

    #[test]
    fn test_agent_draft_requires_name() {
        assert!(AgentDraft::named("").validate().is_err());
        assert!(AgentDraft::named("Scout").validate().is_ok());
    }

    #[test]
    fn test_agent_deserializes_with_defaults() {
        let agent: Agent = serde_json::from_str(r#"{"id":"9","name":"Scout"}"#).unwrap();
        assert_eq!(agent.status, AgentStatus::Inactive);
        assert!(agent.skills.is_empty());
        assert_eq!(agent.position, 0);
    }

    #[test]
    fn test_agent_patch_between_only_carries_changes() {
        let before = scout();
        let mut after = before.clone();
        after.status = AgentStatus::Active;
        after.skills.push("search".to_string());

        let patch = AgentPatch::between(&before, &after);
        assert_eq!(patch.status, Some(AgentStatus::Active));
        assert_eq!(patch.skills, Some(vec!["search".to_string()]));
        assert!(patch.name.is_none());

        let mut merged = before.clone();
        merged.apply_patch(&patch);
        assert_eq!(merged, after);
    }

    #[test]
    fn test_empty_agent_patch_serializes_to_empty_object() {
        let patch = AgentPatch::default();
        assert!(patch.is_empty());
        assert_eq!(serde_json::to_string(&patch).unwrap(), "{}");
    }

    #[test]
    fn test_task_patch_can_unassign() {
        let mut task = TaskDraft::new("triage")
            .assigned_to(AgentId::from("1"))
            .to_task(TaskId::from("t1"), 0);
        let patch = TaskPatch {
            agent_id: Some(None),
            ..TaskPatch::default()
        };
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"agentId":null}"#);
        task.apply_patch(&patch);
        assert!(task.agent_id.is_none());
    }

    #[test]
    fn test_user_email_validation() {
        assert!(UserDraft::new("Ada", "ada@example.com").validate().is_ok());
        assert!(matches!(
            UserDraft::new("Ada", "ada.example.com").validate(),
            Err(ValidationError::InvalidValue { field: "email", .. })
        ));
        assert!(UserDraft::new("Ada", "").validate().is_err());
    }

    #[test]
    fn test_user_draft_debug_redacts_password() {
        let mut draft = UserDraft::new("Ada", "ada@example.com");
        draft.password = Some("hunter2".to_string());
        let rendered = format!("{:?}", draft);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_settings_accept_snake_case_keys() {
        let json = r#"{
            "selected_model": "default_model_name",
            "api_key": "",
            "max_context_window_size": 2048,
            "logging_level": "info",
            "database_file_path": "agent_data.db",
            "debug_mode": false,
            "feature_enabled": true
        }"#;
        let settings: SystemSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.max_context_window_size, 2048);
        assert!(settings.feature_enabled);
        assert!(settings.validate().is_ok());
    }
}
