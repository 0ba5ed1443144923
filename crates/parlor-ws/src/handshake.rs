//! Opening-handshake validation per RFC 6455 §4.2.
//!
//! The HTTP parsing itself is the HTTP stack's job; this module only checks
//! the upgrade headers and computes the accept key. The caller writes the
//! `101 Switching Protocols` response and hands the raw stream to
//! [`MessageConn`](crate::MessageConn).

use base64::prelude::{Engine, BASE64_STANDARD};
use http::{header, HeaderMap, Method};
use sha1::{Digest, Sha1};

use crate::WsError;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// An origin check installed by the server. Returning `false` rejects the
/// upgrade before any state is created.
pub type OriginCheck = dyn Fn(&HeaderMap) -> bool + Send + Sync;

/// Validates an upgrade request and returns the `Sec-WebSocket-Accept`
/// value for the 101 response.
///
/// The request qualifies iff the method is GET, `Connection` contains the
/// token `Upgrade` and `Upgrade` contains `websocket` (token-level,
/// case-insensitive), `Sec-WebSocket-Version` is `13`, a
/// `Sec-WebSocket-Key` is present, and the origin check (if any) accepts
/// the headers.
pub fn check_upgrade(
    method: &Method,
    headers: &HeaderMap,
    check_origin: Option<&OriginCheck>,
) -> Result<String, WsError> {
    if method != Method::GET {
        return Err(WsError::Handshake("method must be GET".into()));
    }

    if let Some(check) = check_origin {
        if !check(headers) {
            return Err(WsError::Handshake("origin not allowed".into()));
        }
    }

    if !header_contains_token(headers, header::CONNECTION, "upgrade")
        || !header_contains_token(headers, header::UPGRADE, "websocket")
    {
        return Err(WsError::Handshake("missing upgrade headers".into()));
    }

    let version_ok = headers
        .get(header::SEC_WEBSOCKET_VERSION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "13")
        .unwrap_or(false);
    if !version_ok {
        return Err(WsError::Handshake(
            "unsupported Sec-WebSocket-Version".into(),
        ));
    }

    let key = headers
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WsError::Handshake("missing Sec-WebSocket-Key".into()))?;

    Ok(accept_key(key))
}

/// Computes `base64(sha1(key || GUID))`.
pub fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Token-level header matching: every value of `name` is split on commas
/// and each token compared case-insensitively after trimming.
fn header_contains_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}
