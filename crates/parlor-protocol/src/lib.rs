//! Wire protocol for the Parlor chat hub.
//!
//! This crate defines the JSON messages exchanged with players, agents and
//! the admin UI, and how they are converted to and from bytes:
//!
//! - **Types** ([`Envelope`], [`ChatMessage`], [`Participant`], ...) — the
//!   structures that travel on the wire.
//! - **Normalization** ([`Envelope::normalize`]) — the legacy-alias rules
//!   that keep older clients speaking the canonical command names.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — serialization seam.
//!
//! The protocol layer knows nothing about connections or rooms; it only
//! describes what the bytes mean.

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    AgentPresence, ChatMessage, Envelope, Participant, Role, RoomSnapshot,
    RoomSummary, CMD_CHAT_HISTORY, CMD_CHAT_MESSAGE, CMD_CHAT_TYPING,
    CMD_SYSTEM_NOTICE,
};
