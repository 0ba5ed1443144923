//! WebSocket plumbing for the Parlor chat hub.
//!
//! This crate turns a raw duplex byte stream into a message-oriented
//! WebSocket connection, in two parts:
//!
//! - [`handshake`] — validates an HTTP upgrade request and computes the
//!   `Sec-WebSocket-Accept` value for the `101 Switching Protocols`
//!   response.
//! - [`MessageConn`] — the frame codec: reads masked client frames one at a
//!   time (handling ping/pong/close inline), writes unmasked server frames
//!   under a mutex, and honors read/write deadlines and a read-payload
//!   limit.
//!
//! Only FIN-terminated single frames are supported; fragmented messages and
//! extensions are rejected as unsupported data.

mod conn;
mod error;
pub mod handshake;

pub use conn::{MessageConn, MessageKind, MessageReader, MessageWriter, Opcode};
pub use error::{
    is_unexpected_close, WsError, CLOSE_ABNORMAL, CLOSE_GOING_AWAY, CLOSE_NORMAL,
};
