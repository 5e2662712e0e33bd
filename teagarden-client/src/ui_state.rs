//! Transient UI state: selection, dialogs with their draft buffers, search
//! queries, drag state and notifications.
//!
//! Nothing here is ever rolled back by a failed remote call, and nothing
//! here is authoritative. Edit buffers are owned copies of the committed
//! entity, so editing them cannot touch the store.

use crate::notifications::{Notification, NotificationLevel};
use crate::store::DomainState;
use teagarden_core::{
    Agent, AgentDraft, AgentId, SystemSettings, Task, TaskDraft, User, UserDraft,
};

/// Copy-on-open edit buffer: the entity as it was when the dialog opened
/// and the copy the user is editing.
#[derive(Debug, Clone, PartialEq)]
pub struct EditBuffer<T> {
    original: T,
    pub working: T,
}

impl<T: Clone + PartialEq> EditBuffer<T> {
    pub fn open(entity: &T) -> Self {
        Self {
            original: entity.clone(),
            working: entity.clone(),
        }
    }

    pub fn original(&self) -> &T {
        &self.original
    }

    pub fn is_dirty(&self) -> bool {
        self.original != self.working
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dialog {
    AddAgent(AgentDraft),
    EditAgent(EditBuffer<Agent>),
    ConfirmTerminate(AgentId),
    AddTask(TaskDraft),
    EditTask(EditBuffer<Task>),
    CreateUser(UserDraft),
    EditUser(EditBuffer<User>),
    EditSettings(EditBuffer<SystemSettings>),
    AddGraphNode(String),
}

/// Lists that support drag-and-drop reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragList {
    Agents,
    Tasks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragState {
    pub list: DragList,
    pub from: usize,
    pub over: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQueries {
    pub agents: String,
    pub tasks: String,
    pub users: String,
    pub graph: String,
}

#[derive(Debug, Clone, Default)]
pub struct UiState {
    pub selected_agent: Option<AgentId>,
    pub dialog: Option<Dialog>,
    pub search: SearchQueries,
    pub drag: Option<DragState>,
    pub notifications: Vec<Notification>,
    /// Set when the session was rejected; the shell should show login.
    pub redirect_to_login: bool,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select an agent. Unknown ids are ignored.
    pub fn select_agent(&mut self, state: &DomainState, id: &AgentId) -> bool {
        match state.agents.get(id) {
            Some(agent) => {
                self.selected_agent = Some(agent.id.clone());
                true
            }
            None => false,
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected_agent = None;
    }

    /// Open a dialog, replacing (and discarding) any open one.
    pub fn open_dialog(&mut self, dialog: Dialog) {
        self.dialog = Some(dialog);
    }

    /// Close the open dialog. Its draft is discarded.
    pub fn close_dialog(&mut self) -> Option<Dialog> {
        self.dialog.take()
    }

    pub fn begin_drag(&mut self, list: DragList, from: usize) {
        self.drag = Some(DragState {
            list,
            from,
            over: from,
        });
    }

    pub fn drag_over(&mut self, index: usize) {
        if let Some(drag) = self.drag.as_mut() {
            drag.over = index;
        }
    }

    /// Finish the drag, returning what was moved where.
    pub fn end_drag(&mut self) -> Option<DragState> {
        self.drag.take()
    }

    pub fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.push_notification(Notification::new(level, message));
    }

    pub fn push_notification(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn dismiss_notification(&mut self, index: usize) -> Option<Notification> {
        (index < self.notifications.len()).then(|| self.notifications.remove(index))
    }

    /// The session is gone: drop everything in progress and go to login.
    pub fn on_unauthorized(&mut self) {
        self.dialog = None;
        self.drag = None;
        self.redirect_to_login = true;
    }

    /// Consume the login redirect, if one is pending.
    pub fn take_redirect(&mut self) -> bool {
        std::mem::take(&mut self.redirect_to_login)
    }

    /// Bring references in line with the store: follow provisional ids to
    /// their confirmed ids and drop a selection whose agent is gone.
    pub fn reconcile(&mut self, state: &DomainState) {
        if let Some(id) = self.selected_agent.take() {
            let id = state.agents.resolve(&id);
            if state.agents.contains(&id) {
                self.selected_agent = Some(id);
            }
        }
        if let Some(Dialog::ConfirmTerminate(id)) = self.dialog.as_mut() {
            *id = state.agents.resolve(id);
        }
    }
}
