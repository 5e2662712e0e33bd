//! User administration.

use super::state::DomainState;
use super::{validate, OpKey, OperationKind, Store};
use crate::error::StoreResult;
use std::future::Future;
use teagarden_core::{EntityIdType, User, UserDraft, UserId, UserPatch};

impl Store {
    pub fn load_users(&self) -> impl Future<Output = StoreResult<()>> + Send + '_ {
        let mut ticket = self.queue.ticket(OpKey::Users);
        async move {
            ticket.ready().await;
            self.run_load(
                OperationKind::LoadUsers,
                OpKey::Users,
                || self.gateway.list_users(),
                |users: &Vec<User>| validate::users_snapshot(users),
                Store::install::<User>,
            )
            .await
        }
    }

    /// Create a user. Emails are unique ignoring case.
    pub fn create_user(&self, draft: UserDraft) -> impl Future<Output = StoreResult<User>> + Send + '_ {
        let provisional = UserId::provisional();
        let mut ticket = self.queue.ticket(OpKey::User(provisional.clone()));
        async move {
            ticket.ready().await;
            draft.validate()?;
            let remote = self.gateway.create_user(&draft);
            self.insert_entity(
                OperationKind::CreateUser,
                provisional.clone(),
                |state| {
                    validate::unique_email(&state.users, &draft.email, None)?;
                    Ok(draft.to_user(provisional.clone()))
                },
                remote,
            )
            .await
        }
    }

    pub fn update_user(
        &self,
        id: &UserId,
        patch: UserPatch,
    ) -> impl Future<Output = StoreResult<User>> + Send + '_ {
        let id = self.resolve::<User>(id);
        let mut ticket = self.queue.ticket(OpKey::User(id.clone()));
        async move {
            ticket.ready().await;
            patch.validate()?;
            let id = self.resolve::<User>(&id);
            let remote = self.gateway.update_user(&id, &patch);
            let edit = |state: &DomainState, user: &mut User| {
                if let Some(email) = &patch.email {
                    validate::unique_email(&state.users, email, Some(&id))?;
                }
                user.apply_patch(&patch);
                Ok(())
            };
            self.change_entity(OperationKind::UpdateUser, &id, edit, remote)
                .await
        }
    }

    pub fn delete_user(&self, id: &UserId) -> impl Future<Output = StoreResult<()>> + Send + '_ {
        let id = self.resolve::<User>(id);
        let mut ticket = self.queue.ticket(OpKey::User(id.clone()));
        async move {
            ticket.ready().await;
            let id = self.resolve::<User>(&id);
            let remote = self.gateway.delete_user(&id);
            self.remove_entity::<User>(OperationKind::DeleteUser, &id, remote)
                .await
        }
    }
}
