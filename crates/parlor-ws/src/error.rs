//! Error types for the WebSocket layer.

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Peer is going away (tab closed, server shutting down).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Errors produced by the upgrade check and the frame codec.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// The HTTP request does not qualify as a WebSocket upgrade.
    #[error("bad handshake: {0}")]
    Handshake(String),

    /// The peer sent a close frame. `code` defaults to 1000 when the frame
    /// has no body.
    #[error("close {code}: {reason}")]
    Closed { code: u16, reason: String },

    /// Fragmented message, unknown opcode, or other frame shape this codec
    /// does not support.
    #[error("unsupported data")]
    UnsupportedData,

    /// A client frame arrived without masking, which RFC 6455 forbids.
    #[error("client frames must be masked")]
    Unmasked,

    /// The frame payload exceeds the configured read limit.
    #[error("payload of {0} bytes exceeds read limit")]
    TooLarge(usize),

    /// A read or write deadline elapsed.
    #[error("deadline exceeded")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Returns `true` when `err` is a close frame with an unexpected code.
///
/// With an empty `codes` list, "unexpected" means 1001 (going away) or
/// 1006 (abnormal closure). Callers use this only to decide whether a
/// disconnect is worth logging.
pub fn is_unexpected_close(err: &WsError, codes: &[u16]) -> bool {
    let WsError::Closed { code, .. } = err else {
        return false;
    };
    if codes.is_empty() {
        matches!(*code, CLOSE_GOING_AWAY | CLOSE_ABNORMAL)
    } else {
        codes.contains(code)
    }
}
