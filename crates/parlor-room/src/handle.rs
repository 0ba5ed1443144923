//! Client handles: the room-facing side of a live connection.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parlor_protocol::Role;
use tokio::sync::mpsc;

/// Counter for process-unique connection ids.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// The identity and outbound queue of one live WebSocket connection.
///
/// Rooms store handles — not connections — so the hub can fan out without
/// touching sockets: delivery is a non-blocking enqueue onto the
/// connection's bounded queue, and the write task on the other side drains
/// it. Cloning a handle is cheap; all clones address the same queue.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    conn_id: u64,
    room_id: String,
    id: String,
    role: Role,
    display_name: String,
    sender: mpsc::Sender<Bytes>,
}

impl ClientHandle {
    pub fn new(
        room_id: impl Into<String>,
        id: impl Into<String>,
        role: Role,
        display_name: impl Into<String>,
        sender: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            conn_id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            room_id: room_id.into(),
            id: id.into(),
            role,
            display_name: display_name.into(),
            sender,
        }
    }

    /// Process-unique id of the underlying connection. Two connections of
    /// the same participant get distinct ids.
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Non-blocking enqueue onto the connection's outbound queue.
    ///
    /// Returns `false` when the queue is full or the connection is gone;
    /// the frame is dropped in that case, never blocked on.
    pub fn try_send(&self, frame: Bytes) -> bool {
        self.sender.try_send(frame).is_ok()
    }
}
