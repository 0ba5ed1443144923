//! Codec seam: converts wire types to and from bytes.
//!
//! The hub serializes every envelope exactly once per broadcast and shares
//! the buffer across recipients, so the codec is the single place where
//! bytes are produced. [`JsonCodec`] is the production implementation; the
//! trait exists so tests and future binary formats can swap it out.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes values into bytes and decodes bytes back into values.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// JSON keeps the wire format readable in browser DevTools and matches what
/// the admin and client pages already speak.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
