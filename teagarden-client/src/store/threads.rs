//! Per-agent message threads. Messages are append-only.

use super::state::DomainState;
use super::{validate, OpKey, OperationKind, PreImage, Store};
use crate::error::{StoreError, StoreResult};
use chrono::Utc;
use std::future::Future;
use teagarden_core::{
    AgentId, EntityIdType, EntityKind, Message, MessageDraft, MessageId, Timestamp,
};

/// Latest timestamp in a thread, ignoring `skip`.
fn latest(thread: &[Message], skip: Option<&MessageId>) -> Option<Timestamp> {
    thread
        .iter()
        .filter(|m| Some(&m.id) != skip)
        .map(|m| m.timestamp)
        .max()
}

impl Store {
    /// Replace an agent's thread with the server's, oldest first. Messages
    /// still being sent stay at the end.
    pub fn load_thread(&self, agent_id: &AgentId) -> impl Future<Output = StoreResult<()>> + Send + '_ {
        let agent_id = self.read(|state| state.agents.resolve(agent_id));
        let mut ticket = self.queue.ticket(OpKey::Thread(agent_id.clone()));
        async move {
            ticket.ready().await;
            let agent_id = self.read(|state| state.agents.resolve(&agent_id));
            self.run_load(
                OperationKind::LoadThread,
                OpKey::Thread(agent_id.clone()),
                || self.gateway.list_messages(&agent_id),
                |messages: &Vec<Message>| validate::thread_snapshot(&agent_id, messages),
                |state: &mut DomainState, mut messages: Vec<Message>| {
                    messages.sort_by_key(|m| m.timestamp);
                    let in_flight: Vec<Message> = state
                        .threads
                        .get(&agent_id)
                        .into_iter()
                        .flatten()
                        .filter(|m| {
                            state
                                .ledger
                                .any_pending(|op| op.pre_image.inserted_message(&m.id))
                        })
                        .cloned()
                        .collect();
                    for mut message in in_flight {
                        if let Some(last) = latest(&messages, None) {
                            message.timestamp = message.timestamp.max(last);
                        }
                        messages.push(message);
                    }
                    state.threads.insert(agent_id.clone(), messages);
                },
            )
            .await
        }
    }

    /// Append a user message to an agent's thread and post it.
    pub fn send_message(
        &self,
        agent_id: &AgentId,
        text: &str,
    ) -> impl Future<Output = StoreResult<Message>> + Send + '_ {
        let agent_id = self.read(|state| state.agents.resolve(agent_id));
        let draft = MessageDraft::from_user(text);
        let mut ticket = self.queue.ticket(OpKey::Thread(agent_id.clone()));
        async move {
            ticket.ready().await;
            draft.validate()?;
            let agent_id = self.read(|state| state.agents.resolve(&agent_id));
            let provisional = MessageId::provisional();

            let op = self.mutate(|state| {
                if !state.agents.contains(&agent_id) {
                    return Err(StoreError::not_found(EntityKind::Agent, &agent_id));
                }
                let thread = state.threads.entry(agent_id.clone()).or_default();
                let now = Utc::now();
                let timestamp = latest(thread, None).map_or(now, |last| now.max(last));
                thread.push(Message {
                    id: provisional.clone(),
                    agent_id: agent_id.clone(),
                    text: draft.text.clone(),
                    sender: draft.sender,
                    timestamp,
                });
                Ok(state.ledger.begin(
                    OperationKind::SendMessage,
                    OpKey::Thread(agent_id.clone()),
                    PreImage::Message {
                        agent_id: agent_id.clone(),
                        message_id: provisional.clone(),
                    },
                ))
            })?;

            match self.gateway.post_message(&agent_id, &draft).await {
                Ok(mut message) => Ok(self.commit(op, |state| {
                    message.agent_id = agent_id.clone();
                    // A thread dropped by a terminate stays dropped.
                    if !state.agents.contains(&agent_id) {
                        return message;
                    }
                    let Some(thread) = state.threads.get_mut(&agent_id) else {
                        return message;
                    };
                    if let Some(last) = latest(thread, Some(&provisional)) {
                        message.timestamp = message.timestamp.max(last);
                    }
                    match thread.iter().position(|m| m.id == provisional) {
                        Some(index) => thread[index] = message.clone(),
                        None => thread.push(message.clone()),
                    }
                    message
                })),
                Err(err) => Err(self.rollback(op, err)),
            }
        }
    }
}
