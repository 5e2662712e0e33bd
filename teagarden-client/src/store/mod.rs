//! Domain store: the single authoritative cache of remote entities.
//!
//! Every mutating operation is optimistic. It applies locally, records a
//! pre-image in the ledger, calls the gateway and then commits or rolls
//! back. Operations on the same key run in issue order; different keys do
//! not wait on each other. The state lock is never held across an await.

mod agents;
mod family;
mod graph;
pub mod operation;
pub mod selectors;
mod session;
mod settings;
pub mod state;
mod tasks;
mod threads;
mod users;
mod validate;

pub use operation::{
    ErrorKey, Ledger, OpKey, OperationId, OperationKind, OperationPhase, PendingOperation,
    PreImage, RecordedError, SettledOperation, Snapshot,
};
pub use selectors::{Assignee, TaskView};
pub use session::{ClaimsError, TokenClaims};
pub use state::{AuthStatus, Collection, DomainState, Entry, Session};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::gateway::{Gateway, GatewayError, GatewayErrorKind, GatewayResult};
use crate::persistence::TokenStorage;
use crate::queue::KeyedQueue;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use teagarden_core::ValidationResult;
use tokio::sync::watch;

pub struct Store {
    gateway: Arc<dyn Gateway>,
    tokens: Arc<dyn TokenStorage>,
    state: Mutex<DomainState>,
    queue: KeyedQueue<OpKey>,
    config: StoreConfig,
    revision: watch::Sender<u64>,
}

impl Store {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        tokens: Arc<dyn TokenStorage>,
        config: StoreConfig,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            gateway,
            tokens,
            state: Mutex::new(DomainState::new(config.history_limit)),
            queue: KeyedQueue::new(),
            config,
            revision,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Run a read-only closure against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&DomainState) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Receiver that observes a counter bumped on every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Whether no operation is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut DomainState) -> R) -> R {
        let result = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut state)
        };
        self.revision.send_modify(|rev| *rev += 1);
        result
    }

    /// Settle an operation as committed after applying the server's answer.
    fn commit<R>(&self, op: OperationId, apply: impl FnOnce(&mut DomainState) -> R) -> R {
        self.mutate(|state| Self::settle_committed(state, op, apply))
    }

    /// Commit with the server's record if `check` accepts it. A rejected
    /// record rolls the operation back as a malformed response.
    fn commit_checked<V, R>(
        &self,
        op: OperationId,
        kind: OperationKind,
        record: V,
        check: impl FnOnce(&DomainState, &V) -> ValidationResult<()>,
        apply: impl FnOnce(&mut DomainState, V) -> R,
    ) -> StoreResult<R> {
        self.mutate(|state| {
            if let Err(invalid) = check(state, &record) {
                tracing::warn!(operation = %kind, reason = %invalid, "Rejected malformed payload");
                let error = StoreError::Remote(GatewayError::malformed(invalid.to_string()));
                self.settle_rolled_back(state, op, &error);
                return Err(error);
            }
            Ok(Self::settle_committed(state, op, |state| apply(state, record)))
        })
    }

    /// Undo an operation's optimistic change and record why.
    fn rollback(&self, op: OperationId, err: GatewayError) -> StoreError {
        let error = StoreError::Remote(err);
        self.mutate(|state| self.settle_rolled_back(state, op, &error));
        error
    }

    fn settle_committed<R>(
        state: &mut DomainState,
        op: OperationId,
        apply: impl FnOnce(&mut DomainState) -> R,
    ) -> R {
        let result = apply(state);
        if let Some(done) = state.ledger.settle(op, OperationPhase::Committed) {
            tracing::info!(operation = %done.kind, target = %done.target, "Operation committed");
            state
                .ledger
                .clear_error(&ErrorKey::new(done.kind, done.target));
        }
        result
    }

    fn settle_rolled_back(&self, state: &mut DomainState, op: OperationId, error: &StoreError) {
        if let Some(failed) = state.ledger.settle(op, OperationPhase::RolledBack) {
            tracing::warn!(
                operation = %failed.kind,
                target = %failed.target,
                error = %error,
                "Operation rolled back"
            );
            state.restore(failed.pre_image);
            state
                .ledger
                .record_error(ErrorKey::new(failed.kind, failed.target), error.clone());
        }
        self.handle_unauthorized(state, error);
    }

    /// Clear a previous error for an operation that has no ledger entry.
    fn succeed(&self, state: &mut DomainState, kind: OperationKind, target: OpKey) {
        state.ledger.clear_error(&ErrorKey::new(kind, target));
    }

    /// Record a failure for an operation that has no ledger entry.
    fn fail(&self, kind: OperationKind, target: OpKey, error: StoreError) -> StoreError {
        tracing::warn!(operation = %kind, target = %target, error = %error, "Operation failed");
        self.mutate(|state| {
            state
                .ledger
                .record_error(ErrorKey::new(kind, target), error.clone());
            self.handle_unauthorized(state, &error);
        });
        error
    }

    /// An invalid session ends it, whatever operation noticed.
    fn handle_unauthorized(&self, state: &mut DomainState, error: &StoreError) {
        if !error.is_unauthorized() {
            return;
        }
        tracing::warn!("Session rejected by server; logging out");
        state.session = Session::logged_out();
        self.gateway.set_bearer_token(None);
        if let Err(e) = self.tokens.clear() {
            tracing::warn!(error = %e, "Failed to clear stored token");
        }
    }

    /// Call a read-only endpoint, retrying on network errors.
    async fn load_with_retry<T, F, Fut>(&self, kind: OperationKind, mut fetch: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let attempts = self.config.load_attempts.max(1);
        let mut attempt = 1;
        loop {
            match fetch().await {
                Err(err) if err.kind == GatewayErrorKind::Network && attempt < attempts => {
                    tracing::debug!(operation = %kind, attempt, error = %err, "Retrying load");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Fetch a snapshot, validate it and install it. On any failure the
    /// previous state is left untouched and the error is recorded.
    async fn run_load<T, F, Fut>(
        &self,
        kind: OperationKind,
        target: OpKey,
        fetch: F,
        validate: impl FnOnce(&T) -> ValidationResult<()>,
        apply: impl FnOnce(&mut DomainState, T),
    ) -> StoreResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let snapshot = match self.load_with_retry(kind, fetch).await {
            Ok(snapshot) => snapshot,
            Err(err) => return Err(self.fail(kind, target, err.into())),
        };
        if let Err(invalid) = validate(&snapshot) {
            tracing::warn!(operation = %kind, reason = %invalid, "Rejected malformed payload");
            return Err(self.fail(kind, target, GatewayError::malformed(invalid.to_string()).into()));
        }
        self.mutate(|state| {
            apply(state, snapshot);
            self.succeed(state, kind, target.clone());
        });
        tracing::debug!(operation = %kind, "Snapshot loaded");
        Ok(())
    }
}
