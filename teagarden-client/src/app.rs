//! App controller: turns UI intents into store operations and reflects
//! their outcome in the UI state.

use crate::config::ClientConfig;
use crate::error::{ClientError, StoreError, StoreResult};
use crate::gateway::RestGateway;
use crate::notifications::{Notification, NotificationLevel};
use crate::persistence::FileTokenStorage;
use crate::store::{selectors, Store, TaskView};
use crate::ui_state::{Dialog, DragList, EditBuffer, UiState};
use std::sync::Arc;
use teagarden_core::{
    Agent, AgentDraft, AgentId, AgentPatch, AgentStatus, EntityKind, GraphNode, Message,
    SettingsPatch, TaskDraft, TaskId, TaskPatch, User, UserDraft, UserId, UserPatch,
};

pub struct App {
    store: Arc<Store>,
    pub ui: UiState,
}

impl App {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            ui: UiState::new(),
        }
    }

    /// Wire the REST gateway and file token storage from configuration and
    /// resume any stored session.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let gateway = Arc::new(RestGateway::new(config)?);
        let tokens = Arc::new(FileTokenStorage::new(config.token_path.clone()));
        let store = Arc::new(Store::new(gateway, tokens, config.store.clone()));
        let mut app = Self::new(store);
        if !app.store.restore_session() {
            app.ui.redirect_to_login = true;
        }
        Ok(app)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Load everything the console shows. Users are only listed for admins.
    pub async fn refresh(&mut self) {
        let store = Arc::clone(&self.store);
        let (agents, tasks, graph, settings) = tokio::join!(
            store.load_agents(),
            store.load_tasks(),
            store.load_graph(),
            store.load_settings(),
        );
        let users = if store.read(selectors::is_admin) {
            store.load_users().await
        } else {
            Ok(())
        };
        for result in [agents, tasks, graph, settings, users] {
            if let Err(err) = result {
                self.report(err);
            }
        }
        self.reconcile();
    }

    pub fn select_agent(&mut self, id: &AgentId) -> bool {
        self.store.read(|state| self.ui.select_agent(state, id))
    }

    /// Agents matching the agent search box.
    pub fn visible_agents(&self) -> Vec<Agent> {
        self.store.read(|state| {
            selectors::filtered_agents(state, &self.ui.search.agents)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// Tasks matching the task search box, with assignees resolved.
    pub fn visible_tasks(&self) -> Vec<TaskView> {
        self.store
            .read(|state| selectors::filtered_task_views(state, &self.ui.search.tasks))
    }

    /// Users matching the user search box.
    pub fn visible_users(&self) -> Vec<User> {
        self.store.read(|state| {
            selectors::filtered_users(state, &self.ui.search.users)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// Select an agent and load its thread.
    pub async fn open_thread(&mut self, id: &AgentId) -> StoreResult<()> {
        if !self.select_agent(id) {
            return Ok(());
        }
        let result = self.store.load_thread(id).await;
        self.settle(result)
    }

    pub async fn send_message(&mut self, agent_id: &AgentId, text: &str) -> StoreResult<Message> {
        let result = self.store.send_message(agent_id, text).await;
        self.settle(result)
    }

    // ------------------------------------------------------------------
    // Dialogs
    // ------------------------------------------------------------------

    pub fn open_add_agent(&mut self) {
        self.ui.open_dialog(Dialog::AddAgent(AgentDraft::default()));
    }

    pub fn open_edit_agent(&mut self, id: &AgentId) -> bool {
        let buffer = self.store.read(|state| state.agents.get(id).map(EditBuffer::open));
        self.open_if_found(buffer.map(Dialog::EditAgent))
    }

    pub fn open_confirm_terminate(&mut self, id: &AgentId) -> bool {
        let id = self
            .store
            .read(|state| state.agents.get(id).map(|agent| agent.id.clone()));
        self.open_if_found(id.map(Dialog::ConfirmTerminate))
    }

    pub fn open_add_task(&mut self) {
        self.ui.open_dialog(Dialog::AddTask(TaskDraft {
            agent_id: self.ui.selected_agent.clone(),
            ..TaskDraft::default()
        }));
    }

    pub fn open_edit_task(&mut self, id: &TaskId) -> bool {
        let buffer = self.store.read(|state| state.tasks.get(id).map(EditBuffer::open));
        self.open_if_found(buffer.map(Dialog::EditTask))
    }

    pub fn open_create_user(&mut self) {
        self.ui.open_dialog(Dialog::CreateUser(UserDraft::default()));
    }

    pub fn open_edit_user(&mut self, id: &UserId) -> bool {
        let buffer = self.store.read(|state| state.users.get(id).map(EditBuffer::open));
        self.open_if_found(buffer.map(Dialog::EditUser))
    }

    /// Settings can only be edited once they are loaded.
    pub fn open_edit_settings(&mut self) -> bool {
        let buffer = self
            .store
            .read(|state| state.settings.as_ref().map(EditBuffer::open));
        self.open_if_found(buffer.map(Dialog::EditSettings))
    }

    pub fn open_add_graph_node(&mut self) {
        self.ui.open_dialog(Dialog::AddGraphNode(String::new()));
    }

    pub fn close_dialog(&mut self) {
        self.ui.close_dialog();
    }

    /// Submit the open dialog. On success it closes; on failure it stays
    /// open with its draft and an error notification is raised. An edit
    /// with no changes closes without contacting the server.
    pub async fn submit_dialog(&mut self) -> StoreResult<()> {
        let Some(dialog) = self.ui.dialog.clone() else {
            return Ok(());
        };
        let store = Arc::clone(&self.store);
        let outcome = match dialog {
            Dialog::AddAgent(draft) => store
                .add_agent(draft)
                .await
                .map(|agent| format!("Agent {} created", agent.name)),
            Dialog::EditAgent(buffer) => {
                let patch = AgentPatch::between(buffer.original(), &buffer.working);
                if patch.is_empty() {
                    return self.close_unchanged();
                }
                store
                    .update_agent(&buffer.original().id, patch)
                    .await
                    .map(|agent| format!("Agent {} updated", agent.name))
            }
            Dialog::ConfirmTerminate(id) => store
                .terminate_agent(&id)
                .await
                .map(|()| "Agent terminated".to_string()),
            Dialog::AddTask(draft) => store
                .add_task(draft)
                .await
                .map(|_| "Task created".to_string()),
            Dialog::EditTask(buffer) => {
                let patch = TaskPatch::between(buffer.original(), &buffer.working);
                if patch.is_empty() {
                    return self.close_unchanged();
                }
                store
                    .update_task(&buffer.original().id, patch)
                    .await
                    .map(|_| "Task updated".to_string())
            }
            Dialog::CreateUser(draft) => store
                .create_user(draft)
                .await
                .map(|user| format!("User {} created", user.name)),
            Dialog::EditUser(buffer) => {
                let patch = UserPatch::between(buffer.original(), &buffer.working);
                if patch.is_empty() {
                    return self.close_unchanged();
                }
                store
                    .update_user(&buffer.original().id, patch)
                    .await
                    .map(|user| format!("User {} updated", user.name))
            }
            Dialog::EditSettings(buffer) => {
                let patch = SettingsPatch::between(buffer.original(), &buffer.working);
                if patch.is_empty() {
                    return self.close_unchanged();
                }
                store
                    .update_settings(patch)
                    .await
                    .map(|_| "Settings saved".to_string())
            }
            Dialog::AddGraphNode(label) => store
                .add_graph_node(&label)
                .await
                .map(|node| format!("Node {} added", node.display_label())),
        };

        let message = self.settle(outcome)?;
        self.ui.close_dialog();
        self.ui.notify(NotificationLevel::Success, message);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Direct actions
    // ------------------------------------------------------------------

    /// Start an inactive agent or stop an active one.
    pub async fn toggle_agent(&mut self, id: &AgentId) -> StoreResult<Agent> {
        let status = self
            .store
            .read(|state| state.agents.get(id).map(|agent| agent.status));
        let result = match status {
            Some(AgentStatus::Active) => self.store.stop_agent(id).await,
            Some(AgentStatus::Inactive) => self.store.start_agent(id).await,
            None => Err(StoreError::not_found(EntityKind::Agent, id)),
        };
        self.settle(result)
    }

    pub async fn delete_task(&mut self, id: &TaskId) -> StoreResult<()> {
        let result = self.store.delete_task(id).await;
        self.settle(result)
    }

    pub async fn delete_user(&mut self, id: &UserId) -> StoreResult<()> {
        let result = self.store.delete_user(id).await;
        self.settle(result)
    }

    /// Finish a drag and persist the new order. Dropping in place sends
    /// nothing.
    pub async fn drop_drag(&mut self) -> StoreResult<()> {
        let Some(drag) = self.ui.end_drag() else {
            return Ok(());
        };
        let result = match drag.list {
            DragList::Agents => self.store.reorder_agents(drag.from, drag.over).await,
            DragList::Tasks => self.store.reorder_tasks(drag.from, drag.over).await,
        };
        self.settle(result)
    }

    /// Find the first node whose label contains `query`, ignoring case.
    pub fn search_graph(&mut self, query: &str) -> Option<GraphNode> {
        self.ui.search.graph = query.to_string();
        let found = self.store.read(|state| state.graph.find_node(query).cloned());
        if found.is_none() {
            self.ui.notify(NotificationLevel::Info, "No node found.");
        }
        found
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    pub async fn login(&mut self, email: &str, password: &str) -> StoreResult<User> {
        let result = self.store.login(email, password).await;
        let user = self.settle(result)?;
        self.ui.redirect_to_login = false;
        self.ui.notify(NotificationLevel::Success, format!("Welcome, {}", user.name));
        Ok(user)
    }

    pub async fn logout(&mut self) {
        self.store.logout().await;
        self.ui = UiState::new();
        self.ui.redirect_to_login = true;
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn open_if_found(&mut self, dialog: Option<Dialog>) -> bool {
        match dialog {
            Some(dialog) => {
                self.ui.open_dialog(dialog);
                true
            }
            None => false,
        }
    }

    fn close_unchanged(&mut self) -> StoreResult<()> {
        self.ui.close_dialog();
        Ok(())
    }

    /// Reflect an operation's outcome in the UI.
    fn settle<T>(&mut self, result: StoreResult<T>) -> StoreResult<T> {
        let result = result.map_err(|err| self.report(err));
        self.reconcile();
        result
    }

    fn report(&mut self, err: StoreError) -> StoreError {
        self.ui.push_notification(Notification::from_error(&err));
        if err.is_unauthorized() {
            self.ui.on_unauthorized();
        }
        err
    }

    fn reconcile(&mut self) {
        self.store.read(|state| self.ui.reconcile(state));
    }
}
