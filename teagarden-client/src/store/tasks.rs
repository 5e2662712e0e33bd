//! Task operations.

use super::state::DomainState;
use super::{validate, OpKey, OperationKind, Store};
use crate::error::StoreResult;
use std::future::Future;
use teagarden_core::{EntityIdType, Task, TaskDraft, TaskId, TaskPatch};

impl Store {
    /// Replace the task collection with the server's.
    pub fn load_tasks(&self) -> impl Future<Output = StoreResult<()>> + Send + '_ {
        let mut ticket = self.queue.ticket(OpKey::Tasks);
        async move {
            ticket.ready().await;
            self.run_load(
                OperationKind::LoadTasks,
                OpKey::Tasks,
                || self.gateway.list_tasks(),
                |tasks: &Vec<Task>| validate::tasks_snapshot(tasks),
                Store::install::<Task>,
            )
            .await
        }
    }

    /// Create a task. An assignee must be a known agent.
    pub fn add_task(&self, draft: TaskDraft) -> impl Future<Output = StoreResult<Task>> + Send + '_ {
        let provisional = TaskId::provisional();
        let mut ticket = self.queue.ticket(OpKey::Task(provisional.clone()));
        async move {
            ticket.ready().await;
            draft.validate()?;
            let mut draft = draft;
            draft.agent_id = self.read(|state| {
                draft.agent_id.as_ref().map(|id| state.agents.resolve(id))
            });
            let remote = self.gateway.create_task(&draft);
            self.insert_entity(
                OperationKind::AddTask,
                provisional.clone(),
                |state| {
                    validate::assignee(&state.agents, draft.agent_id.as_ref())?;
                    let mut task = draft.to_task(provisional.clone(), state.tasks.len());
                    task.created_at = Some(chrono::Utc::now());
                    Ok(task)
                },
                remote,
            )
            .await
        }
    }

    /// Shallow-merge `patch` into a task. Reassigning checks the new agent;
    /// clearing the assignee is always allowed.
    pub fn update_task(
        &self,
        id: &TaskId,
        patch: TaskPatch,
    ) -> impl Future<Output = StoreResult<Task>> + Send + '_ {
        let id = self.resolve::<Task>(id);
        let mut ticket = self.queue.ticket(OpKey::Task(id.clone()));
        async move {
            ticket.ready().await;
            patch.validate()?;
            let id = self.resolve::<Task>(&id);
            let mut patch = patch;
            if let Some(Some(agent_id)) = patch.agent_id.as_mut() {
                *agent_id = self.read(|state| state.agents.resolve(agent_id));
            }
            let remote = self.gateway.update_task(&id, &patch);
            let edit = |state: &DomainState, task: &mut Task| {
                if let Some(Some(agent_id)) = &patch.agent_id {
                    validate::assignee(&state.agents, Some(agent_id))?;
                }
                task.apply_patch(&patch);
                Ok(())
            };
            self.change_entity(OperationKind::UpdateTask, &id, edit, remote)
                .await
        }
    }

    pub fn delete_task(&self, id: &TaskId) -> impl Future<Output = StoreResult<()>> + Send + '_ {
        let id = self.resolve::<Task>(id);
        let mut ticket = self.queue.ticket(OpKey::Task(id.clone()));
        async move {
            ticket.ready().await;
            let id = self.resolve::<Task>(&id);
            let remote = self.gateway.delete_task(&id);
            self.remove_entity::<Task>(OperationKind::DeleteTask, &id, remote)
                .await
        }
    }

    /// Move the task at `from` to `to` and persist the new order.
    pub fn reorder_tasks(
        &self,
        from: usize,
        to: usize,
    ) -> impl Future<Output = StoreResult<()>> + Send + '_ {
        let mut ticket = self.queue.ticket(OpKey::Tasks);
        async move {
            ticket.ready().await;
            self.reorder_entities::<Task, _, _>(
                OperationKind::ReorderTasks,
                from,
                to,
                |ids| async move { self.gateway.reorder_tasks(&ids).await },
            )
            .await
        }
    }
}
