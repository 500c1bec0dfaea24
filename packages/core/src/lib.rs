//! Contests core: wire data model, domain events, and channel/topic names.

pub mod contest;
pub mod events;
pub mod messages;
pub mod names;

pub use contest::Contest;
pub use events::{DomainEvent, EventKind};
pub use messages::{ContestRef, CreateContest, ListContests, TopQuery};
