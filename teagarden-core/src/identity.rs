//! Identity types for Teagarden entities

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Prefix carried by locally generated ids that the server has not confirmed.
pub const PROVISIONAL_PREFIX: &str = "tmp-";

/// Common behaviour of the string-backed entity identifiers.
///
/// Identifiers are opaque: the server decides their shape, the client only
/// compares them. Locally created entities get a provisional id until the
/// server assigns the real one.
pub trait EntityIdType:
    Clone + fmt::Debug + fmt::Display + PartialEq + Eq + std::hash::Hash + Send + Sync + 'static
{
    /// Wrap a raw identifier.
    fn new(raw: impl Into<String>) -> Self;

    /// Borrow the raw identifier.
    fn as_str(&self) -> &str;

    /// Generate a fresh provisional id (`tmp-<uuidv7>`).
    fn provisional() -> Self {
        Self::new(format!("{}{}", PROVISIONAL_PREFIX, Uuid::now_v7()))
    }

    /// Whether this id was generated locally and is still unconfirmed.
    fn is_provisional(&self) -> bool {
        self.as_str().starts_with(PROVISIONAL_PREFIX)
    }
}

/// Wire form of an identifier. Some endpoints send integers.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                <RawId as serde::Deserialize>::deserialize(deserializer).map(|raw| Self(raw.into_string()))
            }
        }

        impl EntityIdType for $name {
            fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

define_entity_id!(
    /// Identifier of an agent.
    AgentId
);
define_entity_id!(
    /// Identifier of a task.
    TaskId
);
define_entity_id!(
    /// Identifier of a user account.
    UserId
);
define_entity_id!(
    /// Identifier of a thread message.
    MessageId
);
define_entity_id!(
    /// Identifier of a knowledge-graph node.
    NodeId
);
