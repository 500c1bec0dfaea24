//! Request payloads for the six contest operations.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` so the JSON on the
//! broker matches what existing callers send. Inputs are caller-trusted;
//! there is no validation layer beyond shape decoding.

use serde::{Deserialize, Serialize};

/// Payload of `contests.create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContest {
    pub id: String,
    pub tag: String,
    pub emoji: String,
}

/// Payload of `contests.list`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListContests {
    /// When true, only contests with `running == true` are returned.
    #[serde(default)]
    pub only_running: bool,
}

/// Payload of `contests.delete`, `contests.start` and `contests.stop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestRef {
    pub id: String,
}

/// Payload of `contests.top`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopQuery {
    pub id: String,
    /// Vote counter to rank by; becomes the `votes.<voteType>` sort path.
    pub vote_type: String,
    /// Maximum number of identifiers to return.
    pub amount: usize,
}
