//! A single conversation's state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use parlor_protocol::{ChatMessage, Participant, Role, RoomSnapshot, RoomSummary};

use crate::ClientHandle;

/// One chat room: ordered history, participant registries, live clients.
///
/// All mutable state sits behind a single read-write lock; the id and
/// creation time are immutable. Methods never perform I/O under the lock —
/// broadcast-style callers take a copy of [`clients`](Room::clients) and
/// contact them after release.
pub struct Room {
    id: String,
    created_at: DateTime<Utc>,
    inner: RwLock<RoomInner>,
}

struct RoomInner {
    history: Vec<ChatMessage>,
    clients: HashMap<u64, ClientHandle>,
    players: HashMap<String, Participant>,
    agents: HashMap<String, Participant>,
    assigned_agent_id: Option<String>,
    last_activity: DateTime<Utc>,
    next_sequence: i64,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            inner: RwLock::new(RoomInner {
                history: Vec::new(),
                clients: HashMap::new(),
                players: HashMap::new(),
                agents: HashMap::new(),
                assigned_agent_id: None,
                last_activity: now,
                next_sequence: 0,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.inner.read().last_activity
    }

    /// Attaches a live connection and returns its participant entry.
    ///
    /// Re-adding a connection that is already live only refreshes the
    /// participant. A reconnect may carry a new display name; the
    /// participant entry is updated from the client either way.
    pub fn add_client(&self, client: &ClientHandle) -> Participant {
        let now = Utc::now();
        let mut inner = self.inner.write();

        if inner.clients.contains_key(&client.conn_id()) {
            return ensure_participant(&mut inner, client, now).clone();
        }

        inner.clients.insert(client.conn_id(), client.clone());
        let participant = ensure_participant(&mut inner, client, now);
        participant.connected = true;
        participant.last_seen = now;
        let participant = participant.clone();
        inner.last_activity = now;
        participant
    }

    /// Detaches a live connection. The participant stays in its registry
    /// with `connected = false`; history and assignment are untouched.
    pub fn remove_client(&self, client: &ClientHandle) {
        let now = Utc::now();
        let mut inner = self.inner.write();

        if inner.clients.remove(&client.conn_id()).is_none() {
            return;
        }

        let registry = match client.role() {
            Role::Player => &mut inner.players,
            Role::Agent => &mut inner.agents,
        };
        if let Some(participant) = registry.get_mut(client.id()) {
            participant.connected = false;
            participant.last_seen = now;
        }
    }

    /// Advances `last_activity`, but only forward.
    pub fn touch(&self, ts: DateTime<Utc>) {
        let mut inner = self.inner.write();
        if ts > inner.last_activity {
            inner.last_activity = ts;
        }
    }

    /// Stores a message: assigns the next sequence number, appends to
    /// history, advances activity, and touches the sender's `last_seen`.
    pub fn add_message(&self, mut msg: ChatMessage) -> ChatMessage {
        let mut inner = self.inner.write();

        inner.next_sequence += 1;
        msg.sequence = inner.next_sequence;

        inner.history.push(msg.clone());
        inner.last_activity = msg.timestamp;

        if let Some(participant) = inner.players.get_mut(&msg.sender_id) {
            participant.last_seen = msg.timestamp;
        }
        if let Some(participant) = inner.agents.get_mut(&msg.sender_id) {
            participant.last_seen = msg.timestamp;
        }

        msg
    }

    /// Returns a copy of the history newer than `sequence` plus the current
    /// sequence counter. `sequence <= 0` returns the full history.
    pub fn messages_since(&self, sequence: i64) -> (Vec<ChatMessage>, i64) {
        let inner = self.inner.read();
        let start = if sequence <= 0 {
            0
        } else {
            // History is sorted by construction.
            inner.history.partition_point(|m| m.sequence <= sequence)
        };
        (inner.history[start..].to_vec(), inner.next_sequence)
    }

    pub fn next_sequence(&self) -> i64 {
        self.inner.read().next_sequence
    }

    /// Copies the live-client set. Broadcast enqueues against the copy,
    /// outside the lock.
    pub fn clients(&self) -> Vec<ClientHandle> {
        self.inner.read().clients.values().cloned().collect()
    }

    pub fn has_client(&self, client: &ClientHandle) -> bool {
        self.inner.read().clients.contains_key(&client.conn_id())
    }

    /// Designates `agent_id` as the room's assigned agent, creating a
    /// disconnected agent participant if none exists yet.
    ///
    /// Assignment is administrative and does not imply a live connection.
    /// An existing participant keeps its `connected` state and only has
    /// its display name refreshed.
    pub fn set_assigned_agent(&self, agent_id: &str, display_name: &str) {
        let now = Utc::now();
        let mut inner = self.inner.write();

        inner
            .agents
            .entry(agent_id.to_string())
            .and_modify(|participant| {
                participant.display_name = display_name.to_string();
                participant.role = Role::Agent;
            })
            .or_insert_with(|| Participant {
                id: agent_id.to_string(),
                display_name: display_name.to_string(),
                role: Role::Agent,
                connected: false,
                last_seen: now,
            });

        inner.assigned_agent_id = Some(agent_id.to_string());
    }

    /// Returns a copy of the assigned agent's participant entry, if any.
    pub fn assigned_agent(&self) -> Option<Participant> {
        let inner = self.inner.read();
        inner
            .assigned_agent_id
            .as_ref()
            .and_then(|id| inner.agents.get(id))
            .cloned()
    }

    /// Copies of all agent participants, connected or not.
    pub fn agent_participants(&self) -> Vec<Participant> {
        self.inner.read().agents.values().cloned().collect()
    }

    pub fn summary(&self) -> RoomSummary {
        let inner = self.inner.read();
        summarize(&self.id, self.created_at, &inner)
    }

    /// Full copy of the room state for the admin snapshot endpoint.
    pub fn snapshot(&self) -> RoomSnapshot {
        let inner = self.inner.read();

        let mut participants =
            Vec::with_capacity(inner.players.len() + inner.agents.len());
        participants.extend(inner.players.values().cloned());
        participants.extend(inner.agents.values().cloned());

        RoomSnapshot {
            summary: summarize(&self.id, self.created_at, &inner),
            participants,
            history: inner.history.clone(),
            next_sequence: inner.next_sequence,
        }
    }
}

/// Finds or creates the participant entry matching a client, refreshing
/// display name and role from the connection's identity.
fn ensure_participant<'a>(
    inner: &'a mut RoomInner,
    client: &ClientHandle,
    now: DateTime<Utc>,
) -> &'a mut Participant {
    let registry = match client.role() {
        Role::Player => &mut inner.players,
        Role::Agent => &mut inner.agents,
    };

    registry
        .entry(client.id().to_string())
        .and_modify(|participant| {
            participant.display_name = client.display_name().to_string();
            participant.role = client.role();
        })
        .or_insert_with(|| Participant {
            id: client.id().to_string(),
            display_name: client.display_name().to_string(),
            role: client.role(),
            connected: true,
            last_seen: now,
        })
}

fn summarize(id: &str, created_at: DateTime<Utc>, inner: &RoomInner) -> RoomSummary {
    let connected_players = inner.players.values().filter(|p| p.connected).count();
    let connected_agents = inner.agents.values().filter(|p| p.connected).count();

    let assigned = inner
        .assigned_agent_id
        .as_ref()
        .and_then(|id| inner.agents.get(id));

    RoomSummary {
        room_id: id.to_string(),
        created_at,
        last_activity: inner.last_activity,
        player_count: inner.players.len(),
        agent_count: inner.agents.len(),
        connected_player_count: connected_players,
        connected_agent_count: connected_agents,
        assigned_agent_id: assigned.map(|p| p.id.clone()),
        assigned_agent: assigned.map(|p| p.display_name.clone()),
        last_message: inner.history.last().map(|m| m.content.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    fn client(room_id: &str, id: &str, role: Role, name: &str) -> ClientHandle {
        // These tests poke the room directly and never deliver frames, so
        // the receiving end of the queue is not kept around.
        let (tx, _rx) = mpsc::channel::<Bytes>(16);
        ClientHandle::new(room_id, id, role, name, tx)
    }

    fn message(room: &Room, sender: &str, content: &str) -> ChatMessage {
        ChatMessage {
            room_id: room.id().to_string(),
            sender_id: sender.to_string(),
            sender_role: Role::Player,
            display_name: String::new(),
            content: content.to_string(),
            timestamp: Utc::now(),
            sequence: 0,
            metadata: None,
        }
    }

    // =====================================================================
    // add_message() / messages_since()
    // =====================================================================

    #[test]
    fn test_add_message_assigns_dense_increasing_sequences() {
        let room = Room::new("room-1");
        for i in 0..25 {
            let stored = room.add_message(message(&room, "p1", &format!("m{i}")));
            assert_eq!(stored.sequence, i + 1);
        }

        let (history, next) = room.messages_since(0);
        assert_eq!(next, 25);
        assert_eq!(history.len() as i64, next);
        for (index, msg) in history.iter().enumerate() {
            assert_eq!(msg.sequence, index as i64 + 1);
        }
    }

    #[test]
    fn test_messages_since_returns_exact_suffix() {
        let room = Room::new("room-x");
        room.add_message(message(&room, "p1", "hello"));
        room.add_message(message(&room, "p1", "world"));

        let (history, next) = room.messages_since(1);
        assert_eq!(next, 2);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "world");
        assert_eq!(history[0].sequence, 2);
    }

    #[test]
    fn test_messages_since_non_positive_returns_full_history() {
        let room = Room::new("room-x");
        room.add_message(message(&room, "p1", "a"));
        room.add_message(message(&room, "p1", "b"));

        for since in [0, -1, -100] {
            let (history, next) = room.messages_since(since);
            assert_eq!(history.len(), 2, "since = {since}");
            assert_eq!(next, 2);
        }
    }

    #[test]
    fn test_messages_since_past_end_returns_empty() {
        let room = Room::new("room-x");
        room.add_message(message(&room, "p1", "a"));

        let (history, next) = room.messages_since(99);
        assert!(history.is_empty());
        assert_eq!(next, 1);
    }

    #[test]
    fn test_messages_since_returns_a_copy() {
        let room = Room::new("room-x");
        room.add_message(message(&room, "p1", "a"));

        let (history, _) = room.messages_since(0);
        room.add_message(message(&room, "p1", "b"));

        // Later appends must not show up through the earlier copy.
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_add_message_touches_sender_last_seen() {
        let room = Room::new("room-1");
        let c = client("room-1", "p1", Role::Player, "玩家1");
        let before = room.add_client(&c).last_seen;

        let stored = room.add_message(message(&room, "p1", "hi"));
        let snapshot = room.snapshot();
        let participant = snapshot
            .participants
            .iter()
            .find(|p| p.id == "p1")
            .expect("participant should exist");
        assert_eq!(participant.last_seen, stored.timestamp);
        assert!(participant.last_seen >= before);
    }

    // =====================================================================
    // add_client() / remove_client()
    // =====================================================================

    #[test]
    fn test_add_client_creates_connected_participant() {
        let room = Room::new("room-1");
        let c = client("room-1", "p1", Role::Player, "玩家1");

        let participant = room.add_client(&c);
        assert!(participant.connected);
        assert_eq!(participant.display_name, "玩家1");
        assert_eq!(participant.role, Role::Player);
        assert!(room.has_client(&c));
    }

    #[test]
    fn test_add_client_twice_is_idempotent() {
        let room = Room::new("room-1");
        let c = client("room-1", "p1", Role::Player, "玩家1");

        room.add_client(&c);
        room.add_client(&c);

        assert_eq!(room.clients().len(), 1);
        assert_eq!(room.summary().player_count, 1);
    }

    #[test]
    fn test_add_client_reconnect_refreshes_display_name() {
        let room = Room::new("room-1");
        let first = client("room-1", "p1", Role::Player, "玩家1");
        room.add_client(&first);
        room.remove_client(&first);

        let second = client("room-1", "p1", Role::Player, "新名字");
        let participant = room.add_client(&second);

        assert!(participant.connected);
        assert_eq!(participant.display_name, "新名字");
        assert_eq!(room.summary().player_count, 1);
    }

    #[test]
    fn test_remove_client_marks_participant_disconnected() {
        let room = Room::new("room-1");
        let c = client("room-1", "a1", Role::Agent, "客服A");
        room.add_client(&c);

        room.remove_client(&c);

        assert!(!room.has_client(&c));
        let summary = room.summary();
        assert_eq!(summary.agent_count, 1);
        assert_eq!(summary.connected_agent_count, 0);
    }

    #[test]
    fn test_remove_client_unknown_connection_is_noop() {
        let room = Room::new("room-1");
        let known = client("room-1", "p1", Role::Player, "玩家1");
        let stranger = client("room-1", "p2", Role::Player, "玩家2");
        room.add_client(&known);

        room.remove_client(&stranger);

        assert_eq!(room.clients().len(), 1);
        assert_eq!(room.summary().connected_player_count, 1);
    }

    #[test]
    fn test_remove_client_keeps_history_and_assignment() {
        let room = Room::new("room-1");
        let c = client("room-1", "p1", Role::Player, "玩家1");
        room.add_client(&c);
        room.add_message(message(&room, "p1", "hello"));
        room.set_assigned_agent("a1", "客服A");

        room.remove_client(&c);

        assert_eq!(room.next_sequence(), 1);
        assert_eq!(room.assigned_agent().map(|p| p.id), Some("a1".to_string()));
    }

    // =====================================================================
    // touch()
    // =====================================================================

    #[test]
    fn test_touch_only_advances_forward() {
        let room = Room::new("room-1");
        let later = Utc::now() + chrono::Duration::seconds(60);
        room.touch(later);
        assert_eq!(room.last_activity(), later);

        let earlier = later - chrono::Duration::seconds(30);
        room.touch(earlier);
        assert_eq!(room.last_activity(), later);
    }

    // =====================================================================
    // set_assigned_agent()
    // =====================================================================

    #[test]
    fn test_set_assigned_agent_creates_disconnected_participant() {
        let room = Room::new("room-1");

        room.set_assigned_agent("a1", "客服A");

        let assigned = room.assigned_agent().expect("agent should be assigned");
        assert_eq!(assigned.id, "a1");
        assert_eq!(assigned.display_name, "客服A");
        assert_eq!(assigned.role, Role::Agent);
        assert!(!assigned.connected);
    }

    #[test]
    fn test_set_assigned_agent_preserves_connected_state() {
        // Re-assigning an agent who is online must not mark them offline.
        let room = Room::new("room-1");
        let c = client("room-1", "a1", Role::Agent, "客服A");
        room.add_client(&c);

        room.set_assigned_agent("a1", "客服A");

        let assigned = room.assigned_agent().expect("agent should be assigned");
        assert!(assigned.connected);
    }

    #[test]
    fn test_set_assigned_agent_refreshes_display_name() {
        let room = Room::new("room-1");
        room.set_assigned_agent("a1", "客服A");
        room.set_assigned_agent("a1", "客服甲");

        let assigned = room.assigned_agent().expect("agent should be assigned");
        assert_eq!(assigned.display_name, "客服甲");
        assert_eq!(room.summary().agent_count, 1);
    }

    #[test]
    fn test_set_assigned_agent_replaces_previous_assignment() {
        let room = Room::new("room-1");
        room.set_assigned_agent("a1", "客服A");
        room.set_assigned_agent("a2", "客服B");

        let assigned = room.assigned_agent().expect("agent should be assigned");
        assert_eq!(assigned.id, "a2");
        // The previous agent stays in the registry.
        assert_eq!(room.summary().agent_count, 2);
    }

    // =====================================================================
    // summary() / snapshot()
    // =====================================================================

    #[test]
    fn test_summary_reports_counts_and_last_message() {
        let room = Room::new("room-1");
        let player = client("room-1", "p1", Role::Player, "玩家1");
        let agent = client("room-1", "a1", Role::Agent, "客服A");
        room.add_client(&player);
        room.add_client(&agent);
        room.remove_client(&agent);
        room.add_message(message(&room, "p1", "最後一句"));

        let summary = room.summary();
        assert_eq!(summary.room_id, "room-1");
        assert_eq!(summary.player_count, 1);
        assert_eq!(summary.agent_count, 1);
        assert_eq!(summary.connected_player_count, 1);
        assert_eq!(summary.connected_agent_count, 0);
        assert_eq!(summary.last_message.as_deref(), Some("最後一句"));
        assert_eq!(summary.created_at, room.created_at());
        assert!(summary.last_activity >= summary.created_at);
    }

    #[test]
    fn test_snapshot_includes_both_registries_and_history() {
        let room = Room::new("room-1");
        room.add_client(&client("room-1", "p1", Role::Player, "玩家1"));
        room.set_assigned_agent("a1", "客服A");
        room.add_message(message(&room, "p1", "hi"));

        let snapshot = room.snapshot();
        assert_eq!(snapshot.participants.len(), 2);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.next_sequence, 1);
        assert_eq!(snapshot.summary.assigned_agent.as_deref(), Some("客服A"));
        assert_eq!(snapshot.summary.assigned_agent_id.as_deref(), Some("a1"));
    }
}
