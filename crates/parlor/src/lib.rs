//! # Parlor
//!
//! The real-time chat core of a customer-service messaging system: a hub
//! that terminates WebSocket connections with its own frame codec, keeps
//! players and support agents in isolated rooms with ordered history, and
//! exposes a small admin API for routing agents to conversations.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use parlor::prelude::*;
//!
//! # async fn run() -> Result<(), ParlorError> {
//! let auth = StaticTokenAuthenticator::new()
//!     .with_token("secret", "admin", AccountRole::Admin);
//!
//! let server = ParlorServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(auth)
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! Clients connect to `GET /ws?role={player|agent}&roomId=...&id=...` and
//! exchange JSON envelopes; admins drive `/api/rooms` and friends with a
//! bearer token.

mod api;
mod auth;
mod client;
mod error;
mod server;

pub use api::ApiError;
pub use auth::{AccountRole, AuthError, Authenticator, Identity, StaticTokenAuthenticator};
pub use client::Client;
pub use error::ParlorError;
pub use server::{ParlorServer, ParlorServerBuilder};

/// Re-exports everything an embedding application needs.
pub mod prelude {
    // Meta crate
    pub use crate::{
        AccountRole, ApiError, AuthError, Authenticator, Client, Identity,
        ParlorError, ParlorServer, ParlorServerBuilder, StaticTokenAuthenticator,
    };

    // Protocol types
    pub use parlor_protocol::{
        AgentPresence, ChatMessage, Codec, Envelope, JsonCodec, Participant,
        ProtocolError, Role, RoomSnapshot, RoomSummary, CMD_CHAT_HISTORY,
        CMD_CHAT_MESSAGE, CMD_CHAT_TYPING, CMD_SYSTEM_NOTICE,
    };

    // Room layer
    pub use parlor_room::{ClientHandle, Hub, HubError, Room};

    // WebSocket layer
    pub use parlor_ws::{
        is_unexpected_close, MessageConn, MessageKind, MessageReader,
        MessageWriter, Opcode, WsError,
    };
}
