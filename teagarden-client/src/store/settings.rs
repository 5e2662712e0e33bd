//! System settings from the administration screen.

use super::state::DomainState;
use super::{OpKey, OperationKind, PreImage, Store};
use crate::error::{StoreError, StoreResult};
use std::future::Future;
use teagarden_core::{EntityKind, SettingsPatch, SystemSettings};

impl Store {
    pub fn load_settings(&self) -> impl Future<Output = StoreResult<()>> + Send + '_ {
        let mut ticket = self.queue.ticket(OpKey::Settings);
        async move {
            ticket.ready().await;
            self.run_load(
                OperationKind::LoadSettings,
                OpKey::Settings,
                || self.gateway.fetch_settings(),
                SystemSettings::validate,
                |state: &mut DomainState, settings: SystemSettings| {
                    state.settings = Some(settings);
                },
            )
            .await
        }
    }

    /// Merge `patch` into the loaded settings. Fails with `NotFound` when
    /// settings have not been loaded yet.
    pub fn update_settings(
        &self,
        patch: SettingsPatch,
    ) -> impl Future<Output = StoreResult<SystemSettings>> + Send + '_ {
        let mut ticket = self.queue.ticket(OpKey::Settings);
        async move {
            ticket.ready().await;
            let (op, optimistic) = self.mutate(|state| {
                let current = state
                    .settings
                    .clone()
                    .ok_or_else(|| StoreError::not_found(EntityKind::Settings, "system"))?;
                let mut next = current.clone();
                next.apply_patch(&patch);
                next.validate()?;
                state.settings = Some(next.clone());
                let op = state.ledger.begin(
                    OperationKind::UpdateSettings,
                    OpKey::Settings,
                    PreImage::Settings(current),
                );
                Ok::<_, StoreError>((op, next))
            })?;

            match self.gateway.update_settings(&patch).await {
                Ok(confirmed) => self.commit_checked(
                    op,
                    OperationKind::UpdateSettings,
                    confirmed.unwrap_or(optimistic),
                    |_, settings| settings.validate(),
                    |state, settings| {
                        state.settings = Some(settings.clone());
                        settings
                    },
                ),
                Err(err) => Err(self.rollback(op, err)),
            }
        }
    }
}
