//! Default channel and topic names.
//!
//! These are the conventional names; a deployment can override all of them
//! through the resolved configuration.

/// Request/response channels for the six operations.
pub mod channels {
    pub const CREATE: &str = "contests.create";
    pub const LIST: &str = "contests.list";
    pub const DELETE: &str = "contests.delete";
    pub const START: &str = "contests.start";
    pub const STOP: &str = "contests.stop";
    pub const TOP: &str = "contests.top";
}

/// Event topics for confirmed mutations.
pub mod topics {
    pub const CREATED: &str = "contests.created";
    pub const DELETED: &str = "contests.deleted";
    pub const STARTED: &str = "contests.started";
    pub const STOPPED: &str = "contests.stopped";
}

/// Bootstrap channels for configuration resolution.
pub mod config {
    pub const GET: &str = "config.get";
    pub const CHANGED: &str = "config.changed";
}
