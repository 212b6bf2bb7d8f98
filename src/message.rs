use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Progress sentinel: the worker is past byte transfer and assembling output.
pub const PROGRESS_FINISHING: i32 = 100;
/// Progress sentinel: everything completed.
pub const PROGRESS_SUCCESS: i32 = 101;
/// Progress sentinel: completed, but some items of a set failed.
pub const PROGRESS_PARTIAL: i32 = 102;

/// Verbs the dispatcher can send to the worker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display, Serialize, Deserialize, JsonSchema,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    Start,
    StartSet,
    StartSetRange,
    Pause,
    Resume,
}

/// Command message, dispatcher → worker.
///
/// `id` is the engine-assigned job identifier; the dispatcher refuses to send
/// a command whose id is absent or a placeholder, because the worker echoes it
/// back on (some) status messages and it is the only reliable correlation key.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandMessage {
    #[serde(rename = "type")]
    pub command: CommandType,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_end: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

/// The two lifecycle labels the worker is known to broadcast. The wire field
/// stays a plain string; anything unrecognized simply fails to parse and is
/// ignored by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
pub enum StatusLabel {
    Paused,
    Resuming,
}

/// Status message, worker → dispatcher. Every field is optional on the wire:
/// the transport's serialization boundary is known to drop identifiers, and
/// unrelated broadcasts share the same channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl StatusMessage {
    /// The identifier the message explicitly names, if any. `id` wins over
    /// `original_id` when both are present.
    pub fn explicit_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.original_id.as_deref())
    }

    /// The recognized status label, if the raw string parses to one.
    pub fn status_label(&self) -> Option<StatusLabel> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    /// Progress with the worker's legacy `completed` flag folded in: a bare
    /// `completed: true` means full success.
    pub fn effective_progress(&self) -> Option<i32> {
        self.progress
            .or_else(|| (self.completed == Some(true)).then_some(PROGRESS_SUCCESS))
    }

    /// Does the message say anything about a job's lifecycle at all?
    /// Minimal messages carry no progress/status/error and no positive
    /// `completed` flag; the identifier-less correlation tier treats them as
    /// noise, and a `Preparing` job treats them as a bare ack. A lone
    /// `completed: false` is in that bucket: it names no fact to apply.
    pub fn has_substance(&self) -> bool {
        self.progress.is_some()
            || self.status.is_some()
            || self.error.is_some()
            || self.completed == Some(true)
    }

    pub fn is_minimal(&self) -> bool {
        !self.has_substance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_serializes_with_wire_field_names() {
        let cmd = CommandMessage {
            command: CommandType::StartSetRange,
            id: "job-1".into(),
            url: Some("https://example.com/a".into()),
            range_start: Some(2),
            range_end: Some(9),
            timestamp: Utc::now(),
        };
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v["type"], "START_SET_RANGE");
        assert_eq!(v["id"], "job-1");
        assert_eq!(v["rangeStart"], 2);
        assert_eq!(v["rangeEnd"], 9);
        assert!(v.get("timestamp").is_some());
    }

    #[test]
    fn status_parses_partial_wire_objects() {
        let msg: StatusMessage =
            serde_json::from_value(json!({ "originalId": "abc", "progress": 42 })).unwrap();
        assert_eq!(msg.explicit_id(), Some("abc"));
        assert_eq!(msg.progress, Some(42));
        assert!(msg.status.is_none());
        assert!(msg.has_substance());
    }

    #[test]
    fn status_label_parses_known_values_only() {
        let msg: StatusMessage =
            serde_json::from_value(json!({ "status": "Paused" })).unwrap();
        assert_eq!(msg.status_label(), Some(StatusLabel::Paused));

        let msg: StatusMessage =
            serde_json::from_value(json!({ "status": "Verifying" })).unwrap();
        assert_eq!(msg.status_label(), None);
        // an unknown label still counts as substance and survives roundtrip
        assert!(msg.has_substance());
        assert_eq!(serde_json::to_value(&msg).unwrap()["status"], "Verifying");
    }

    #[test]
    fn completed_flag_maps_to_success_progress() {
        let msg = StatusMessage {
            completed: Some(true),
            ..Default::default()
        };
        assert_eq!(msg.effective_progress(), Some(PROGRESS_SUCCESS));

        let msg = StatusMessage {
            completed: Some(false),
            ..Default::default()
        };
        assert_eq!(msg.effective_progress(), None);
        // completed:false states nothing actionable, it reads as a bare ack
        assert!(msg.is_minimal());
    }

    #[test]
    fn minimal_message_detection() {
        assert!(StatusMessage::default().is_minimal());
        let msg = StatusMessage {
            secondary_id: Some("dl-77".into()),
            ..Default::default()
        };
        // an identifier alone is still minimal: nothing to apply
        assert!(msg.is_minimal());
    }
}
