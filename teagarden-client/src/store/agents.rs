//! Agent operations.

use super::state::DomainState;
use super::{validate, OpKey, OperationKind, Store};
use crate::error::StoreResult;
use std::future::Future;
use teagarden_core::{Agent, AgentDraft, AgentId, AgentPatch, AgentStatus, EntityIdType};

impl Store {
    /// Replace the agent collection with the server's.
    pub fn load_agents(&self) -> impl Future<Output = StoreResult<()>> + Send + '_ {
        let mut ticket = self.queue.ticket(OpKey::Agents);
        async move {
            ticket.ready().await;
            self.run_load(
                OperationKind::LoadAgents,
                OpKey::Agents,
                || self.gateway.list_agents(),
                |agents: &Vec<Agent>| validate::agents_snapshot(agents),
                Store::install::<Agent>,
            )
            .await
        }
    }

    /// Create an agent. It appears at the end under a provisional id until
    /// the server confirms it.
    pub fn add_agent(
        &self,
        draft: AgentDraft,
    ) -> impl Future<Output = StoreResult<Agent>> + Send + '_ {
        let provisional = AgentId::provisional();
        let mut ticket = self.queue.ticket(OpKey::Agent(provisional.clone()));
        async move {
            ticket.ready().await;
            draft.validate()?;
            let remote = self.gateway.create_agent(&draft);
            self.insert_entity(
                OperationKind::AddAgent,
                provisional.clone(),
                |state| Ok(draft.to_agent(provisional.clone(), state.agents.len())),
                remote,
            )
            .await
        }
    }

    /// Shallow-merge `patch` into an agent.
    pub fn update_agent(
        &self,
        id: &AgentId,
        patch: AgentPatch,
    ) -> impl Future<Output = StoreResult<Agent>> + Send + '_ {
        let id = self.resolve::<Agent>(id);
        let mut ticket = self.queue.ticket(OpKey::Agent(id.clone()));
        async move {
            ticket.ready().await;
            patch.validate()?;
            let id = self.resolve::<Agent>(&id);
            let remote = self.gateway.update_agent(&id, &patch);
            let edit = |_: &DomainState, agent: &mut Agent| {
                agent.apply_patch(&patch);
                Ok(())
            };
            self.change_entity(OperationKind::UpdateAgent, &id, edit, remote)
                .await
        }
    }

    /// Remove an agent and its thread. Tasks that reference it keep the
    /// reference and resolve to unassigned.
    pub fn terminate_agent(&self, id: &AgentId) -> impl Future<Output = StoreResult<()>> + Send + '_ {
        let id = self.resolve::<Agent>(id);
        let mut ticket = self.queue.ticket(OpKey::Agent(id.clone()));
        async move {
            ticket.ready().await;
            let id = self.resolve::<Agent>(&id);
            let remote = self.gateway.delete_agent(&id);
            self.remove_entity::<Agent>(OperationKind::TerminateAgent, &id, remote)
                .await
        }
    }

    /// Move the agent at `from` to `to` and persist the new order.
    pub fn reorder_agents(
        &self,
        from: usize,
        to: usize,
    ) -> impl Future<Output = StoreResult<()>> + Send + '_ {
        let mut ticket = self.queue.ticket(OpKey::Agents);
        async move {
            ticket.ready().await;
            self.reorder_entities::<Agent, _, _>(
                OperationKind::ReorderAgents,
                from,
                to,
                |ids| async move { self.gateway.reorder_agents(&ids).await },
            )
            .await
        }
    }

    pub fn start_agent(&self, id: &AgentId) -> impl Future<Output = StoreResult<Agent>> + Send + '_ {
        self.set_agent_status(OperationKind::StartAgent, id, AgentStatus::Active)
    }

    pub fn stop_agent(&self, id: &AgentId) -> impl Future<Output = StoreResult<Agent>> + Send + '_ {
        self.set_agent_status(OperationKind::StopAgent, id, AgentStatus::Inactive)
    }

    fn set_agent_status(
        &self,
        kind: OperationKind,
        id: &AgentId,
        status: AgentStatus,
    ) -> impl Future<Output = StoreResult<Agent>> + Send + '_ {
        let id = self.resolve::<Agent>(id);
        let mut ticket = self.queue.ticket(OpKey::Agent(id.clone()));
        async move {
            ticket.ready().await;
            let id = self.resolve::<Agent>(&id);
            let remote = match status {
                AgentStatus::Active => self.gateway.start_agent(&id),
                AgentStatus::Inactive => self.gateway.stop_agent(&id),
            };
            let edit = |_: &DomainState, agent: &mut Agent| {
                agent.status = status;
                Ok(())
            };
            self.change_entity(kind, &id, edit, remote).await
        }
    }
}
