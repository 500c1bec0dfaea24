//! Domain events published after confirmed mutations.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::contest::Contest;

/// Discriminant for the four event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Deleted,
    Started,
    Stopped,
}

impl EventKind {
    /// All kinds, in the order publishers are wired up.
    pub const ALL: [EventKind; 4] = [
        EventKind::Created,
        EventKind::Deleted,
        EventKind::Started,
        EventKind::Stopped,
    ];
}

/// A notification describing a confirmed mutation.
///
/// Emitted only after the store has acknowledged the write. The create
/// event carries the full record; the others carry the identifier alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Created(Contest),
    Deleted { id: String },
    Started { id: String },
    Stopped { id: String },
}

impl DomainEvent {
    /// The topic family this event belongs to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::Created(_) => EventKind::Created,
            DomainEvent::Deleted { .. } => EventKind::Deleted,
            DomainEvent::Started { .. } => EventKind::Started,
            DomainEvent::Stopped { .. } => EventKind::Stopped,
        }
    }

    /// The JSON payload carried on the topic.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            DomainEvent::Created(contest) => {
                serde_json::to_value(contest).unwrap_or(Value::Null)
            }
            DomainEvent::Deleted { id }
            | DomainEvent::Started { id }
            | DomainEvent::Stopped { id } => json!({ "id": id }),
        }
    }
}
