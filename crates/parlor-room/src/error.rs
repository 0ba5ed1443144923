//! Error types for the room layer.
//!
//! The `Display` strings double as user-facing text: dispatch failures are
//! sent back to the offending client as a `system.notice`, and the admin
//! API maps them onto HTTP statuses.

/// Errors that can occur during hub and room operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A client tried to register without a room id.
    #[error("room id is required")]
    RoomIdRequired,

    /// The addressed room does not exist.
    #[error("room not found")]
    RoomNotFound,

    /// A chat message arrived with empty content.
    #[error("content is required")]
    ContentRequired,

    /// The envelope's command is not one the hub understands.
    #[error("unknown message type: {0}")]
    UnknownMessage(String),
}
