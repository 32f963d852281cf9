// src/chat/mod.rs
//
// Live chat subsystem. Binds one publish/subscribe channel to the currently
// selected review record and keeps an ordered, append-only message log of
// local sends and remote deliveries.
//
// Layout mirrors the rest of the client: shared types here, a pure frame
// codec, the channel task, and the controller that owns the lifecycle.

pub mod channel;
pub mod codec;
pub mod controller;
mod error;
mod log;

pub use channel::{ChatChannel, ChatConfig};
pub use controller::SelectionController;
pub use error::ChatError;
pub use log::{LogAppender, MessageLog};

use serde::{Deserialize, Serialize};

/// Identifier of one past review record. Opaque to this subsystem beyond
/// equality and topic derivation.
pub type RecordId = i64;

/// Who produced a chat message. Wire strings match the backend payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    #[serde(rename = "User")]
    User,
    #[serde(rename = "AI")]
    Ai,
}

/// One chat message. Immutable once appended to the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub content: String,
}

/// Current state of a chat channel
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum ChannelState {
    Stopped,
    Starting,
    Running,
    Error(String),
}

/// Topic the backend publishes chat replies on for one record.
pub fn inbound_topic(record_id: RecordId) -> String {
    format!("/topic/messages/{}", record_id)
}

/// Destination user messages are sent to for one record.
pub fn outbound_destination(record_id: RecordId) -> String {
    format!("/app/chat/{}", record_id)
}
