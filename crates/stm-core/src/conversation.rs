//! Conversation turns stored as short-term entries.
//!
//! A turn is stored as `User: ...\nAssistant: ...` so the combined exchange is
//! scored and deduplicated like any other entry. The raw messages travel in the
//! entry metadata, since stored content is normalized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::MemoryEntry;

/// Metadata `type` marking an entry as a conversation turn.
pub const TURN_TYPE: &str = "conversation_turn";

/// One user/assistant exchange recovered from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
    pub recorded_at: DateTime<Utc>,
}

/// Text stored and scored for a turn.
pub fn format_turn(user: &str, assistant: &str) -> String {
    format!("User: {}\nAssistant: {}", user, assistant)
}

/// Metadata attached to a turn entry.
pub fn turn_metadata(user: &str, assistant: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("type".into(), TURN_TYPE.into());
    metadata.insert("user_message".into(), user.into());
    metadata.insert("assistant_message".into(), assistant.into());
    metadata
}

/// Whether an entry was stored as a conversation turn.
pub fn is_turn(entry: &MemoryEntry) -> bool {
    entry.metadata.get("type").and_then(Value::as_str) == Some(TURN_TYPE)
}

/// Rebuild a turn from its entry. Returns `None` for other entries.
pub fn turn_from_entry(entry: &MemoryEntry) -> Option<ConversationTurn> {
    if !is_turn(entry) {
        return None;
    }
    let text = |key: &str| entry.metadata.get(key).and_then(Value::as_str).map(String::from);

    Some(ConversationTurn {
        user: text("user_message")?,
        assistant: text("assistant_message")?,
        recorded_at: entry.created_at,
    })
}

/// The last `last_n` turns among `entries`, oldest first.
pub fn recent_turns(entries: &[MemoryEntry], last_n: usize) -> Vec<ConversationTurn> {
    let mut turns: Vec<ConversationTurn> = entries.iter().filter_map(turn_from_entry).collect();
    turns.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));

    let skip = turns.len().saturating_sub(last_n);
    turns.split_off(skip)
}
