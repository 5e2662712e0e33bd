//! In-memory domain state: normalized collections, threads, graph,
//! settings, session and the operation ledger.

use crate::gateway::Created;
use crate::persistence::AuthToken;
use crate::store::operation::{Ledger, PreImage, Snapshot};
use std::collections::HashMap;
use teagarden_core::{
    Agent, AgentId, EntityIdType, HasEntityId, KnowledgeGraph, Message, Ranked,
    SystemSettings, Task, User,
};

/// Entities a [`Collection`] can hold. Ranked entities mirror their index.
pub trait Entry: HasEntityId + Clone {
    fn rank(&self) -> Option<usize> {
        None
    }

    fn set_rank(&mut self, _rank: usize) {}
}

impl Entry for Agent {
    fn rank(&self) -> Option<usize> {
        Some(self.position())
    }

    fn set_rank(&mut self, rank: usize) {
        self.set_position(rank);
    }
}

impl Entry for Task {
    fn rank(&self) -> Option<usize> {
        Some(self.position())
    }

    fn set_rank(&mut self, rank: usize) {
        self.set_position(rank);
    }
}

impl Entry for User {}

/// Ordered collection with unique ids and dense ranks.
#[derive(Debug, Clone)]
pub struct Collection<T: Entry> {
    items: Vec<T>,
    /// Provisional id to the id the server assigned.
    aliases: HashMap<T::Id, T::Id>,
}

impl<T: Entry> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            aliases: HashMap::new(),
        }
    }
}

impl<T: Entry> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn ids(&self) -> Vec<T::Id> {
        self.items.iter().map(|e| e.entity_id().clone()).collect()
    }

    /// Ids the server knows about, in collection order.
    pub fn confirmed_ids(&self) -> Vec<T::Id> {
        self.items
            .iter()
            .map(|e| e.entity_id())
            .filter(|id| !id.is_provisional())
            .cloned()
            .collect()
    }

    /// Follow a provisional id to its confirmed id.
    pub fn resolve(&self, id: &T::Id) -> T::Id {
        self.aliases.get(id).unwrap_or(id).clone()
    }

    pub fn index_of(&self, id: &T::Id) -> Option<usize> {
        let id = self.resolve(id);
        self.items.iter().position(|e| e.entity_id() == &id)
    }

    pub fn get(&self, id: &T::Id) -> Option<&T> {
        self.index_of(id).map(|i| &self.items[i])
    }

    pub fn contains(&self, id: &T::Id) -> bool {
        self.index_of(id).is_some()
    }

    pub fn at(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    fn renumber(&mut self) {
        for (rank, entity) in self.items.iter_mut().enumerate() {
            entity.set_rank(rank);
        }
    }

    pub fn push(&mut self, entity: T) {
        self.items.push(entity);
        self.renumber();
    }

    /// Insert at `index`, clamped to the end. An existing id is left alone.
    pub fn insert_at(&mut self, index: usize, entity: T) {
        if self.contains(entity.entity_id()) {
            return;
        }
        let index = index.min(self.items.len());
        self.items.insert(index, entity);
        self.renumber();
    }

    /// Replace the entity with the given id in place. Its rank is kept.
    pub fn replace(&mut self, id: &T::Id, entity: T) -> Option<T> {
        let index = self.index_of(id)?;
        let previous = std::mem::replace(&mut self.items[index], entity);
        self.renumber();
        Some(previous)
    }

    pub fn remove(&mut self, id: &T::Id) -> Option<(usize, T)> {
        let index = self.index_of(id)?;
        let entity = self.items.remove(index);
        self.renumber();
        Some((index, entity))
    }

    /// Move the entity at `from` to `to`. Both must be in range.
    pub fn move_item(&mut self, from: usize, to: usize) {
        if from >= self.items.len() || to >= self.items.len() || from == to {
            return;
        }
        let entity = self.items.remove(from);
        self.items.insert(to, entity);
        self.renumber();
    }

    /// Reorder to match `ids`. Unlisted entities keep their relative order
    /// at the end; unknown ids are ignored.
    pub fn restore_order(&mut self, ids: &[T::Id]) {
        let mut remaining = std::mem::take(&mut self.items);
        let mut ordered = Vec::with_capacity(remaining.len());
        for id in ids {
            if let Some(i) = remaining.iter().position(|e| e.entity_id() == id) {
                ordered.push(remaining.remove(i));
            }
        }
        ordered.append(&mut remaining);
        self.items = ordered;
        self.renumber();
    }

    /// Replace the contents with a server snapshot. Ranked snapshots are
    /// ordered by their server rank. Provisional entities for which `keep`
    /// answers true are re-appended.
    pub fn load(&mut self, mut snapshot: Vec<T>, keep: impl Fn(&T::Id) -> bool) {
        if snapshot.iter().all(|e| e.rank().is_some()) {
            snapshot.sort_by_key(|e| e.rank().unwrap_or(usize::MAX));
        }
        let kept: Vec<T> = self
            .items
            .drain(..)
            .filter(|e| e.entity_id().is_provisional() && keep(e.entity_id()))
            .collect();
        self.items = snapshot;
        for entity in kept {
            if !self.contains(entity.entity_id()) {
                self.items.push(entity);
            }
        }
        self.renumber();
    }

    /// Swap a provisional entity for its server-confirmed version and
    /// remember the alias. Returns the confirmed entity as stored.
    pub fn confirm(&mut self, provisional: &T::Id, created: Created<T>) -> Option<T> {
        let confirmed = match created {
            Created::Entity(entity) => Some(entity),
            Created::Acknowledged(id) => self.get(provisional).cloned().map(|mut entity| {
                entity.set_entity_id(id.clone());
                entity
            }),
        }?;
        let server_id = confirmed.entity_id().clone();
        if &server_id != provisional {
            self.aliases.insert(provisional.clone(), server_id.clone());
        }

        let already_present = self
            .items
            .iter()
            .any(|e| e.entity_id() == &server_id && e.entity_id() != provisional);
        let slot = self.items.iter().position(|e| e.entity_id() == provisional);
        match slot {
            Some(index) if already_present => {
                self.items.remove(index);
            }
            Some(index) => self.items[index] = confirmed,
            None if !already_present => self.items.push(confirmed),
            None => {}
        }
        self.renumber();
        self.get(&server_id).cloned()
    }

    /// Undo one optimistic change.
    pub fn restore(&mut self, snapshot: Snapshot<T>) {
        match snapshot {
            Snapshot::Inserted(id) => {
                self.remove(&id);
            }
            Snapshot::Changed(previous) => {
                let id = previous.entity_id().clone();
                self.replace(&id, previous);
            }
            Snapshot::Removed { entity, index } => self.insert_at(index, entity),
            Snapshot::Order(ids) => self.restore_order(&ids),
        }
    }
}

/// Progress of authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    /// Not yet determined; the stored token has not been checked.
    #[default]
    Pending,
    LoggedIn,
    LoggedOut,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub status: AuthStatus,
    pub user: Option<User>,
    pub token: Option<AuthToken>,
}

impl Session {
    pub fn logged_in(user: User, token: AuthToken) -> Self {
        Self {
            status: AuthStatus::LoggedIn,
            user: Some(user),
            token: Some(token),
        }
    }

    pub fn logged_out() -> Self {
        Self {
            status: AuthStatus::LoggedOut,
            user: None,
            token: None,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.status == AuthStatus::LoggedIn
    }
}

/// Everything the store owns.
#[derive(Debug, Clone)]
pub struct DomainState {
    pub agents: Collection<Agent>,
    pub tasks: Collection<Task>,
    pub users: Collection<User>,
    pub threads: HashMap<AgentId, Vec<Message>>,
    pub graph: KnowledgeGraph,
    pub settings: Option<SystemSettings>,
    pub session: Session,
    pub ledger: Ledger,
}

impl DomainState {
    pub fn new(history_limit: usize) -> Self {
        Self {
            agents: Collection::new(),
            tasks: Collection::new(),
            users: Collection::new(),
            threads: HashMap::new(),
            graph: KnowledgeGraph::default(),
            settings: None,
            session: Session::default(),
            ledger: Ledger::new(history_limit),
        }
    }

    /// Apply a pre-image, undoing the optimistic change it was taken for.
    pub fn restore(&mut self, pre_image: PreImage) {
        match pre_image {
            PreImage::Agent(snapshot) => self.agents.restore(snapshot),
            PreImage::Task(snapshot) => self.tasks.restore(snapshot),
            PreImage::User(snapshot) => self.users.restore(snapshot),
            PreImage::Message {
                agent_id,
                message_id,
            } => {
                if let Some(thread) = self.threads.get_mut(&agent_id) {
                    thread.retain(|m| m.id != message_id);
                }
            }
            PreImage::GraphNode(id) => self.graph.nodes.retain(|n| n.id != id),
            PreImage::Settings(previous) => self.settings = Some(previous),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teagarden_core::AgentDraft;

    fn agent(id: &str) -> Agent {
        AgentDraft::named(id.to_uppercase()).to_agent(AgentId::from(id), 99)
    }

    fn positions(c: &Collection<Agent>) -> Vec<usize> {
        c.iter().map(|a| a.position).collect()
    }

    fn ids(c: &Collection<Agent>) -> Vec<String> {
        c.iter().map(|a| a.id.to_string()).collect()
    }

    #[test]
    fn test_push_and_remove_keep_ranks_dense() {
        let mut c = Collection::new();
        for id in ["a", "b", "c"] {
            c.push(agent(id));
        }
        assert_eq!(positions(&c), vec![0, 1, 2]);

        let (index, removed) = c.remove(&AgentId::from("b")).unwrap();
        assert_eq!(index, 1);
        assert_eq!(removed.id.as_str(), "b");
        assert_eq!(positions(&c), vec![0, 1]);

        c.insert_at(10, removed);
        assert_eq!(ids(&c), vec!["a", "c", "b"]);
        assert_eq!(positions(&c), vec![0, 1, 2]);
    }

    #[test]
    fn test_move_and_restore_order() {
        let mut c = Collection::new();
        for id in ["a", "b", "c", "d"] {
            c.push(agent(id));
        }
        let before = c.ids();
        c.move_item(0, 2);
        assert_eq!(ids(&c), vec!["b", "c", "a", "d"]);

        c.push(agent("e"));
        c.restore_order(&before);
        assert_eq!(ids(&c), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(positions(&c), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_load_sorts_by_rank_and_keeps_pending_provisionals() {
        let mut c = Collection::new();
        let provisional = AgentId::provisional();
        let mut pending = agent("x");
        pending.id = provisional.clone();
        c.push(agent("old"));
        c.push(pending);

        let mut first = agent("1");
        first.position = 1;
        let mut second = agent("2");
        second.position = 0;
        c.load(vec![first, second], |id| id == &provisional);

        assert_eq!(ids(&c), vec!["2".to_string(), "1".to_string(), provisional.to_string()]);
        assert_eq!(positions(&c), vec![0, 1, 2]);
    }

    #[test]
    fn test_confirm_acknowledged_rekeys_and_aliases() {
        let mut c = Collection::new();
        let provisional = AgentId::provisional();
        let mut pending = agent("x");
        pending.id = provisional.clone();
        c.push(agent("a"));
        c.push(pending);

        let confirmed = c
            .confirm(&provisional, Created::Acknowledged(AgentId::from("42")))
            .unwrap();
        assert_eq!(confirmed.id.as_str(), "42");
        assert_eq!(confirmed.position, 1);
        assert_eq!(c.resolve(&provisional).as_str(), "42");
        assert!(c.get(&provisional).is_some());
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_confirm_drops_duplicate_when_server_id_already_loaded() {
        let mut c = Collection::new();
        let provisional = AgentId::provisional();
        let mut pending = agent("x");
        pending.id = provisional.clone();
        c.push(agent("42"));
        c.push(pending);

        c.confirm(&provisional, Created::Entity(agent("42")));
        assert_eq!(ids(&c), vec!["42"]);
    }

    #[test]
    fn test_restore_changed_keeps_current_rank() {
        let mut c = Collection::new();
        c.push(agent("a"));
        c.push(agent("b"));
        let mut previous = c.get(&AgentId::from("a")).cloned().unwrap();
        previous.name = "Before".to_string();
        previous.position = 7;
        c.restore(Snapshot::Changed(previous));
        let restored = c.get(&AgentId::from("a")).unwrap();
        assert_eq!(restored.name, "Before");
        assert_eq!(restored.position, 0);
    }
}
