//! Service configuration.
//!
//! Configuration is externally held and resolved over the broker
//! (`config.get`), immutable for the lifetime of one running generation.
//! Every section has a default so a partial config document resolves.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use contests_core::names;

use crate::broker::Broker;

/// Top-level config keys whose change requires a full stop+start cycle.
///
/// Changes to anything else are ignored by the supervisor.
pub const RELEVANT_KEYS: [&str; 3] = ["store", "channels", "topics"];

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Persistence target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    pub connection: String,
    pub database: String,
    pub contests_collection: String,
    /// Externally-owned collection holding meme/vote records.
    pub memes_collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection: "memory://local".to_string(),
            database: "contests".to_string(),
            contests_collection: "contests".to_string(),
            memes_collection: "memes".to_string(),
        }
    }
}

/// Request channel names for the six operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelConfig {
    pub create: String,
    pub list: String,
    pub delete: String,
    pub start: String,
    pub stop: String,
    pub top: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            create: names::channels::CREATE.to_string(),
            list: names::channels::LIST.to_string(),
            delete: names::channels::DELETE.to_string(),
            start: names::channels::START.to_string(),
            stop: names::channels::STOP.to_string(),
            top: names::channels::TOP.to_string(),
        }
    }
}

/// Event topic names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TopicConfig {
    pub created: String,
    pub deleted: String,
    pub started: String,
    pub stopped: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            created: names::topics::CREATED.to_string(),
            deleted: names::topics::DELETED.to_string(),
            started: names::topics::STARTED.to_string(),
            stopped: names::topics::STOPPED.to_string(),
        }
    }
}

/// Startup retry policy for the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StartupConfig {
    pub max_start_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            max_start_attempts: 3,
            retry_delay_ms: 1_000,
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Fully resolved configuration for one generation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub channels: ChannelConfig,
    pub topics: TopicConfig,
    pub startup: StartupConfig,
}

impl ServiceConfig {
    /// Resolve configuration over the broker.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the reply does not
    /// deserialize.
    pub async fn resolve(
        broker: &dyn Broker,
        bootstrap: &BootstrapConfig,
    ) -> anyhow::Result<Self> {
        let reply = broker.request(&bootstrap.get_channel, Value::Null).await?;
        Ok(serde_json::from_value(reply)?)
    }
}

/// What must be known before the first resolve: where configuration lives.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Request channel answering with the full config document.
    pub get_channel: String,
    /// Topic carrying `{ "keys": [...] }` change notifications.
    pub changed_topic: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            get_channel: names::config::GET.to_string(),
            changed_topic: names::config::CHANGED.to_string(),
        }
    }
}

/// Payload of a configuration-change notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigChanged {
    /// Top-level config keys that changed.
    pub keys: Vec<String>,
}

impl ConfigChanged {
    /// True when any changed key affects this service's own wiring.
    #[must_use]
    pub fn is_relevant(&self) -> bool {
        self.keys
            .iter()
            .any(|key| RELEVANT_KEYS.contains(&key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_use_conventional_names() {
        let config = ServiceConfig::default();
        assert_eq!(config.channels.create, "contests.create");
        assert_eq!(config.topics.stopped, "contests.stopped");
        assert_eq!(config.store.contests_collection, "contests");
        assert_eq!(config.startup.max_start_attempts, 3);
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let config: ServiceConfig = serde_json::from_value(json!({
            "store": { "database": "prod" }
        }))
        .unwrap();
        assert_eq!(config.store.database, "prod");
        assert_eq!(config.store.memes_collection, "memes");
        assert_eq!(config.channels.top, "contests.top");
    }

    #[test]
    fn relevance_is_key_set_intersection() {
        let relevant: ConfigChanged = serde_json::from_value(json!({
            "keys": ["telegram", "store"]
        }))
        .unwrap();
        assert!(relevant.is_relevant());

        let irrelevant: ConfigChanged = serde_json::from_value(json!({
            "keys": ["telegram", "logging"]
        }))
        .unwrap();
        assert!(!irrelevant.is_relevant());

        assert!(!ConfigChanged::default().is_relevant());
    }
}
