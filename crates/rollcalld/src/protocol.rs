//! WebSocket message shapes: `{"event": <name>, "data": {...}}`.

use serde::{Deserialize, Serialize};

/// Messages sent by the capture client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// One captured frame, as a data URL or bare base64.
    Frame { image: String },
}

/// Messages sent to the capture client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new attendance record was created for `name`.
    Recognized { name: String },
}

impl ClientEvent {
    /// Parse a text message. Unknown or malformed messages yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, len = text.len(), "ignoring unknown client message");
                None
            }
        }
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
