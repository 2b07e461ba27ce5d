//! Core data model.
//!
//! A message is one decoded event from the shared status channel. The channel
//! multiplexes events for every in-flight command in the tenant, so a
//! message's `id` names the command that produced it, not the subscriber that
//! wants it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action tag under which backend commands publish their status events.
pub const COMMAND_STATUS: &str = "COMMAND_STATUS";

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One decoded event from the status channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Request id of the command this event belongs to.
    pub id: String,

    /// Event payload. Only the `status` field is interpreted here; everything
    /// else is opaque and passed through to the caller.
    pub content: Map<String, Value>,
}

impl Message {
    pub fn new(id: impl Into<String>, content: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }

    /// Build a message whose content carries only a `status` field.
    pub fn with_status(id: impl Into<String>, status: impl Into<String>) -> Self {
        let mut content = Map::new();
        content.insert("status".to_string(), Value::String(status.into()));
        Self {
            id: id.into(),
            content,
        }
    }

    /// The `status` field of the payload, if present and a string.
    pub fn status(&self) -> Option<&str> {
        self.content.get("status").and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Channel Filter
// ---------------------------------------------------------------------------

/// Subscription filter handed to the channel adapter.
///
/// The transport routes on tenant and action. The `id` narrows intent to a
/// single command, but delivery of other ids must be tolerated: the engine
/// re-checks id equality on every message it receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFilter {
    pub tenant_code: String,
    pub action: String,
    pub id: String,
}

impl ChannelFilter {
    pub fn new(
        tenant_code: impl Into<String>,
        action: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_code: tenant_code.into(),
            action: action.into(),
            id: id.into(),
        }
    }
}
