use lightning_core::{Pattern, PatternEdit, Pos, Tempo};
use serde::{Deserialize, Serialize};

/// Input messages from controllers (JSON text frames)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InputMessage {
    // Transport
    Start,
    Stop,
    SetTempo {
        tempo: Tempo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        div: Option<String>,
    },

    // Pattern editing
    Edit { edits: Vec<PatternEdit> },
    Clear { pos: Pos },
    GetPattern,

    // One-shot playback, outside the pattern
    PlaySample {
        sample: String,
        number: i32,
        velocity: i32,
    },
}

/// Output messages to controllers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutputMessage {
    Ok { message: String },
    Error { message: String },
    Pattern { pattern: Pattern },

    // Pushed to every controller
    Position { position: Pos },
    PlaybackError { message: String },
}

impl OutputMessage {
    pub fn ok(message: impl Into<String>) -> Self {
        Self::Ok {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Serialize a message to JSON
pub fn serialize_message<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Deserialize a message from JSON
pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    json: &str,
) -> Result<T, serde_json::Error> {
    serde_json::from_str(json)
}
