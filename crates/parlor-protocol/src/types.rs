//! Wire types for the chat protocol.
//!
//! Every type here is serialized as JSON with camelCase field names, which
//! is what the player and admin front-ends expect. The envelope carries a
//! legacy `type` field alongside `cmd`: older clients send short command
//! names (`message`, `typing`, ...) in either field, and
//! [`Envelope::normalize`] rewrites both to the canonical dotted names.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// A chat message to be stored in a room's history.
pub const CMD_CHAT_MESSAGE: &str = "chat.message";
/// A transient typing indicator; never persisted.
pub const CMD_CHAT_TYPING: &str = "chat.typing";
/// A history request (client → server) or history payload (server → client).
pub const CMD_CHAT_HISTORY: &str = "chat.history";
/// A server-generated notice: joins, leaves, assignments, errors.
pub const CMD_SYSTEM_NOTICE: &str = "system.notice";

/// The side of the conversation a participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Player,
    Agent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Player => "player",
            Role::Agent => "agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "player" => Ok(Role::Player),
            "agent" => Ok(Role::Agent),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown role: {other}"
            ))),
        }
    }
}

/// A persisted chat message belonging to a room.
///
/// Sequence numbers are assigned by the room when the message is stored:
/// the first message of a room has sequence 1, and sequences are strictly
/// increasing with no gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub room_id: String,
    pub sender_id: String,
    pub sender_role: Role,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sequence: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// The payload exchanged over WebSocket connections.
///
/// Inbound envelopes are untrusted: the hub overwrites `sender_id`,
/// `sender_role` and `display_name` with the identity captured at connect
/// time before anything is broadcast. `sender_role` is therefore kept as a
/// plain string here — a client sending garbage in it must not make the
/// whole envelope undecodable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Envelope {
    pub cmd: String,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub room_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sender_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sender_role: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<ChatMessage>>,
    #[serde(skip_serializing_if = "i64_is_zero")]
    pub seq: i64,
    #[serde(skip_serializing_if = "i64_is_zero")]
    pub ack: i64,
}

fn i64_is_zero(value: &i64) -> bool {
    *value == 0
}

impl Envelope {
    /// Rewrites `cmd` and `type` to the canonical command names and fills
    /// whichever of the two is empty from the other.
    ///
    /// Applied at every hop (ingress, unicast, broadcast); idempotent.
    pub fn normalize(&mut self) {
        self.cmd = canonical_cmd(&self.cmd).to_owned();
        self.r#type = canonical_cmd(&self.r#type).to_owned();
        if self.cmd.is_empty() {
            self.cmd = self.r#type.clone();
        }
        if self.r#type.is_empty() {
            self.r#type = self.cmd.clone();
        }
    }
}

/// Maps legacy short command names to their canonical form. Unknown values
/// pass through untouched so the hub can reject them with a useful message.
fn canonical_cmd(value: &str) -> &str {
    match value {
        "message" => CMD_CHAT_MESSAGE,
        "typing" => CMD_CHAT_TYPING,
        "history" => CMD_CHAT_HISTORY,
        "system" => CMD_SYSTEM_NOTICE,
        other => other,
    }
}

/// A known identity within a room, independent of whether a live connection
/// exists right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    pub connected: bool,
    pub last_seen: DateTime<Utc>,
}

/// A lightweight view of a room for the admin room list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub player_count: usize,
    pub agent_count: usize,
    pub connected_player_count: usize,
    pub connected_agent_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}

/// The full state of a room, including history. Returned by the admin
/// snapshot endpoint; every field is a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub summary: RoomSummary,
    pub participants: Vec<Participant>,
    pub history: Vec<ChatMessage>,
    pub next_sequence: i64,
}

/// An online agent and the rooms they are active in, aggregated across the
/// whole hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPresence {
    pub id: String,
    pub display_name: String,
    pub rooms: Vec<String>,
    pub last_seen: DateTime<Utc>,
}
