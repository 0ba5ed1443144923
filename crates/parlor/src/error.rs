//! Unified error type for the meta crate.

use parlor_protocol::ProtocolError;
use parlor_room::HubError;
use parlor_ws::WsError;

use crate::auth::AuthError;

/// Top-level error that wraps all layer-specific errors.
///
/// The `#[from]` attributes generate the conversions, so `?` moves errors
/// from any layer up to this one without ceremony.
#[derive(Debug, thiserror::Error)]
pub enum ParlorError {
    /// Encoding/decoding or message-validation failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// WebSocket handshake or frame-level failure.
    #[error(transparent)]
    Ws(#[from] WsError),

    /// Room or dispatch failure.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Token validation failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
