//! Optimistic insert, change, remove and reorder shared by the ranked and
//! unranked entity collections.

use super::state::{Collection, DomainState, Entry};
use super::{validate, OpKey, OperationKind, PreImage, Snapshot, Store};
use crate::error::{StoreError, StoreResult};
use crate::gateway::{Created, GatewayResult};
use std::future::Future;
use teagarden_core::{require_index, Agent, HasEntityId, Task, User, ValidationResult};

/// A collection in [`DomainState`] with optimistic CRUD.
pub(crate) trait Family: Entry + Send + Sync + 'static {
    fn collection(state: &DomainState) -> &Collection<Self>;

    fn collection_mut(state: &mut DomainState) -> &mut Collection<Self>;

    fn pre_image(snapshot: Snapshot<Self>) -> PreImage;

    fn pending_insert(pre_image: &PreImage, id: &Self::Id) -> bool;

    /// Key for operations on one entity.
    fn key(id: Self::Id) -> OpKey;

    /// Key for loads, inserts and reorders.
    fn collection_key() -> OpKey;

    /// Check a record returned by the server before it replaces the entry
    /// `own`.
    fn check_confirmed(state: &DomainState, entity: &Self, own: &Self::Id) -> ValidationResult<()>;

    /// Cleanup once a removal is confirmed.
    fn on_removed(_state: &mut DomainState, _id: &Self::Id) {}
}

impl Family for Agent {
    fn collection(state: &DomainState) -> &Collection<Self> {
        &state.agents
    }

    fn collection_mut(state: &mut DomainState) -> &mut Collection<Self> {
        &mut state.agents
    }

    fn pre_image(snapshot: Snapshot<Self>) -> PreImage {
        PreImage::Agent(snapshot)
    }

    fn pending_insert(pre_image: &PreImage, id: &Self::Id) -> bool {
        pre_image.inserted_agent(id)
    }

    fn key(id: Self::Id) -> OpKey {
        OpKey::Agent(id)
    }

    fn collection_key() -> OpKey {
        OpKey::Agents
    }

    fn check_confirmed(_state: &DomainState, agent: &Self, _own: &Self::Id) -> ValidationResult<()> {
        agent.validate()
    }

    fn on_removed(state: &mut DomainState, id: &Self::Id) {
        state.threads.remove(id);
    }
}

impl Family for Task {
    fn collection(state: &DomainState) -> &Collection<Self> {
        &state.tasks
    }

    fn collection_mut(state: &mut DomainState) -> &mut Collection<Self> {
        &mut state.tasks
    }

    fn pre_image(snapshot: Snapshot<Self>) -> PreImage {
        PreImage::Task(snapshot)
    }

    fn pending_insert(pre_image: &PreImage, id: &Self::Id) -> bool {
        pre_image.inserted_task(id)
    }

    fn key(id: Self::Id) -> OpKey {
        OpKey::Task(id)
    }

    fn collection_key() -> OpKey {
        OpKey::Tasks
    }

    fn check_confirmed(_state: &DomainState, task: &Self, _own: &Self::Id) -> ValidationResult<()> {
        task.validate()
    }
}

impl Family for User {
    fn collection(state: &DomainState) -> &Collection<Self> {
        &state.users
    }

    fn collection_mut(state: &mut DomainState) -> &mut Collection<Self> {
        &mut state.users
    }

    fn pre_image(snapshot: Snapshot<Self>) -> PreImage {
        PreImage::User(snapshot)
    }

    fn pending_insert(pre_image: &PreImage, id: &Self::Id) -> bool {
        pre_image.inserted_user(id)
    }

    fn key(id: Self::Id) -> OpKey {
        OpKey::User(id)
    }

    fn collection_key() -> OpKey {
        OpKey::Users
    }

    fn check_confirmed(state: &DomainState, user: &Self, own: &Self::Id) -> ValidationResult<()> {
        user.validate()?;
        validate::confirmed_email(&state.users, user, own)
    }
}

// Gateway futures are lazy: nothing is sent until they are awaited, which
// happens only after the optimistic change is in place.
impl Store {
    pub(super) fn resolve<T: Family>(&self, id: &T::Id) -> T::Id {
        self.read(|state| T::collection(state).resolve(id))
    }

    /// Install a server snapshot, keeping provisional entities whose insert
    /// is still pending.
    pub(super) fn install<T: Family>(state: &mut DomainState, snapshot: Vec<T>) {
        let pending: Vec<T::Id> = T::collection(state)
            .iter()
            .map(|e| e.entity_id().clone())
            .filter(|id| state.ledger.any_pending(|op| T::pending_insert(&op.pre_image, id)))
            .collect();
        T::collection_mut(state).load(snapshot, |id| pending.contains(id));
    }

    /// Append the entity built by `build`, then confirm or roll back.
    pub(super) async fn insert_entity<T: Family>(
        &self,
        kind: OperationKind,
        provisional: T::Id,
        build: impl FnOnce(&DomainState) -> StoreResult<T>,
        remote: impl Future<Output = GatewayResult<Created<T>>>,
    ) -> StoreResult<T> {
        let (op, optimistic) = self.mutate(|state| {
            let entity = build(state)?;
            T::collection_mut(state).push(entity.clone());
            let op = state.ledger.begin(
                kind,
                T::collection_key(),
                T::pre_image(Snapshot::Inserted(provisional.clone())),
            );
            Ok::<_, StoreError>((op, entity))
        })?;

        match remote.await {
            Ok(created) => self.commit_checked(
                op,
                kind,
                created,
                |state, created| match created {
                    Created::Entity(entity) => T::check_confirmed(state, entity, &provisional),
                    Created::Acknowledged(_) => Ok(()),
                },
                |state, created| {
                    let mut fallback = optimistic;
                    fallback.set_entity_id(created.id().clone());
                    T::collection_mut(state)
                        .confirm(&provisional, created)
                        .unwrap_or(fallback)
                },
            ),
            Err(err) => Err(self.rollback(op, err)),
        }
    }

    /// Replace an entity with an edited copy, then settle. A confirmed
    /// record from the server replaces the optimistic one.
    pub(super) async fn change_entity<T: Family>(
        &self,
        kind: OperationKind,
        id: &T::Id,
        edit: impl FnOnce(&DomainState, &mut T) -> StoreResult<()>,
        remote: impl Future<Output = GatewayResult<Option<T>>>,
    ) -> StoreResult<T> {
        let (op, optimistic) = self.mutate(|state| {
            let current = T::collection(state)
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::not_found(T::KIND, id))?;
            let mut next = current.clone();
            edit(state, &mut next)?;
            T::collection_mut(state).replace(id, next.clone());
            let op = state.ledger.begin(
                kind,
                T::key(id.clone()),
                T::pre_image(Snapshot::Changed(current)),
            );
            Ok::<_, StoreError>((op, next))
        })?;

        match remote.await {
            Ok(confirmed) => {
                let confirmed = confirmed.map(|mut entity| {
                    entity.set_entity_id(id.clone());
                    entity
                });
                self.commit_checked(
                    op,
                    kind,
                    confirmed,
                    |state, confirmed| match confirmed {
                        Some(entity) => T::check_confirmed(state, entity, id),
                        None => Ok(()),
                    },
                    |state, confirmed| {
                        let collection = T::collection_mut(state);
                        if let Some(entity) = confirmed {
                            collection.replace(id, entity);
                        }
                        collection.get(id).cloned().unwrap_or(optimistic)
                    },
                )
            }
            Err(err) => Err(self.rollback(op, err)),
        }
    }

    /// Remove an entity, then settle. Rollback reinserts it where it was.
    pub(super) async fn remove_entity<T: Family>(
        &self,
        kind: OperationKind,
        id: &T::Id,
        remote: impl Future<Output = GatewayResult<()>>,
    ) -> StoreResult<()> {
        let op = self.mutate(|state| {
            let (index, entity) = T::collection_mut(state)
                .remove(id)
                .ok_or_else(|| StoreError::not_found(T::KIND, id))?;
            Ok::<_, StoreError>(state.ledger.begin(
                kind,
                T::key(id.clone()),
                T::pre_image(Snapshot::Removed { entity, index }),
            ))
        })?;

        match remote.await {
            Ok(()) => {
                self.commit(op, |state| {
                    // A load may have brought it back meanwhile.
                    T::collection_mut(state).remove(id);
                    T::on_removed(state, id);
                });
                Ok(())
            }
            Err(err) => Err(self.rollback(op, err)),
        }
    }

    /// Move the entity at `from` to `to` and persist the resulting order.
    /// Moving an index onto itself changes nothing and sends nothing.
    pub(super) async fn reorder_entities<T, R, Fut>(
        &self,
        kind: OperationKind,
        from: usize,
        to: usize,
        remote: R,
    ) -> StoreResult<()>
    where
        T: Family,
        R: FnOnce(Vec<T::Id>) -> Fut,
        Fut: Future<Output = GatewayResult<()>>,
    {
        let len = self.read(|state| T::collection(state).len());
        require_index(from, len)?;
        require_index(to, len)?;
        if from == to {
            return Ok(());
        }

        let (op, ids) = self.mutate(|state| {
            let collection = T::collection_mut(state);
            let before = collection.ids();
            collection.move_item(from, to);
            let ids = collection.confirmed_ids();
            let op = state
                .ledger
                .begin(kind, T::collection_key(), T::pre_image(Snapshot::Order(before)));
            (op, ids)
        });

        match remote(ids).await {
            Ok(()) => {
                self.commit(op, |_| ());
                Ok(())
            }
            Err(err) => Err(self.rollback(op, err)),
        }
    }
}
