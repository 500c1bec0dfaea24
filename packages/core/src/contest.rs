//! The contest record as stored and as carried on the wire.

use serde::{Deserialize, Serialize};

/// A contest document.
///
/// `id` is the caller-supplied primary key; uniqueness is enforced by the
/// persistence layer's insert semantics. `tag` correlates the contest with
/// externally-owned meme/vote records. After creation only `running` is
/// mutable, toggled by the start/stop operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contest {
    pub id: String,
    pub tag: String,
    pub emoji: String,
    /// Whether the contest is currently accepting votes. Defaults to false
    /// on creation.
    #[serde(default)]
    pub running: bool,
}

impl Contest {
    /// Builds a freshly created contest: `running` always starts false.
    #[must_use]
    pub fn new(id: impl Into<String>, tag: impl Into<String>, emoji: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            emoji: emoji.into(),
            running: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_contest_is_not_running() {
        let contest = Contest::new("summer", "memes", "☀️");
        assert!(!contest.running);
        assert_eq!(contest.id, "summer");
    }

    #[test]
    fn running_defaults_false_when_absent_on_the_wire() {
        let contest: Contest =
            serde_json::from_value(serde_json::json!({"id": "a", "tag": "t", "emoji": "x"}))
                .unwrap();
        assert!(!contest.running);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let value = serde_json::to_value(Contest::new("a", "t", "x")).unwrap();
        assert_eq!(value["running"], serde_json::json!(false));
        assert!(value.get("id").is_some());
    }
}
