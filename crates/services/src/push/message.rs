//! Push channel wire messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use roadmap_core::model::{RoadmapId, UserId};

/// Client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Authenticate {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
}

impl ClientMessage {
    /// # Errors
    ///
    /// Returns `serde_json::Error` if encoding fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Server to client.
///
/// Unknown `type` values decode to `Unknown` instead of failing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Authenticated {
        #[serde(default)]
        data: Option<Authenticated>,
    },
    ProgressUpdate {
        data: ProgressUpdate,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<DateTime<Utc>>,
    },
    ProgressCreated {
        #[serde(default)]
        data: serde_json::Value,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// # Errors
    ///
    /// Returns `serde_json::Error` for malformed JSON or a known type with a bad shape.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Authenticated {
    #[serde(rename = "userId", default)]
    pub user_id: Option<UserId>,
}

/// Payload of `progress_update`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressUpdate {
    TopicProgress {
        #[serde(rename = "roadmapId")]
        roadmap_id: RoadmapId,
        #[serde(default)]
        topic: String,
        #[serde(default)]
        action: String,
    },
    #[serde(other)]
    Other,
}

// A timestamp in an unexpected format should not cost us the whole event.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc)))
}
