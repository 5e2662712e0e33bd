//! Checks applied at the store boundary, to server snapshots and to local
//! intents before any optimistic change.

use super::state::{Collection, Entry};
use std::collections::HashSet;
use teagarden_core::{
    Agent, AgentId, EntityKind, Message, Task, User, UserId, ValidationError,
    ValidationResult,
};

fn unique_ids<T: Entry>(items: &[T]) -> ValidationResult<()> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.entity_id()) {
            return Err(ValidationError::Duplicate {
                field: "id",
                value: item.entity_id().to_string(),
            });
        }
    }
    Ok(())
}

pub(super) fn agents_snapshot(agents: &[Agent]) -> ValidationResult<()> {
    unique_ids(agents)?;
    agents.iter().try_for_each(Agent::validate)
}

pub(super) fn tasks_snapshot(tasks: &[Task]) -> ValidationResult<()> {
    unique_ids(tasks)?;
    tasks.iter().try_for_each(Task::validate)
}

pub(super) fn users_snapshot(users: &[User]) -> ValidationResult<()> {
    unique_ids(users)?;
    users.iter().try_for_each(User::validate)?;
    let mut emails = HashSet::with_capacity(users.len());
    for user in users {
        if !emails.insert(user.email.to_lowercase()) {
            return Err(ValidationError::Duplicate {
                field: "email",
                value: user.email.clone(),
            });
        }
    }
    Ok(())
}

pub(super) fn thread_snapshot(agent_id: &AgentId, messages: &[Message]) -> ValidationResult<()> {
    let mut seen = HashSet::with_capacity(messages.len());
    for message in messages {
        if !seen.insert(&message.id) {
            return Err(ValidationError::Duplicate {
                field: "id",
                value: message.id.to_string(),
            });
        }
        if &message.agent_id != agent_id {
            return Err(ValidationError::InvalidValue {
                field: "agentId",
                reason: format!("message {} belongs to agent {}", message.id, message.agent_id),
            });
        }
    }
    Ok(())
}

/// An assignment must point at a known agent.
pub(super) fn assignee(agents: &Collection<Agent>, agent_id: Option<&AgentId>) -> ValidationResult<()> {
    match agent_id {
        Some(id) if !agents.contains(id) => Err(ValidationError::UnknownReference {
            kind: EntityKind::Agent,
            field: "agentId",
            id: id.to_string(),
        }),
        _ => Ok(()),
    }
}

fn email_free(
    users: &Collection<User>,
    email: &str,
    skip: impl Fn(&UserId) -> bool,
) -> ValidationResult<()> {
    let taken = users
        .iter()
        .any(|u| !skip(&u.id) && u.email.eq_ignore_ascii_case(email));
    if taken {
        return Err(ValidationError::Duplicate {
            field: "email",
            value: email.to_string(),
        });
    }
    Ok(())
}

/// Emails are unique ignoring case. `except` skips the user being edited.
pub(super) fn unique_email(
    users: &Collection<User>,
    email: &str,
    except: Option<&UserId>,
) -> ValidationResult<()> {
    let except = except.map(|id| users.resolve(id));
    email_free(users, email, |id| Some(id) == except.as_ref())
}

/// A user returned by the server may not take another user's email. The
/// entry it replaces (`own`) and any entry already under its id are skipped.
pub(super) fn confirmed_email(
    users: &Collection<User>,
    user: &User,
    own: &UserId,
) -> ValidationResult<()> {
    let own = users.resolve(own);
    email_free(users, &user.email, |id| id == &own || id == &user.id)
}
