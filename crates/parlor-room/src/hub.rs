//! The hub: room registry, dispatch, and broadcast fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use parlor_protocol::{
    AgentPresence, ChatMessage, Codec, Envelope, JsonCodec, Participant, Role,
    RoomSnapshot, RoomSummary, CMD_CHAT_HISTORY, CMD_CHAT_MESSAGE, CMD_CHAT_TYPING,
    CMD_SYSTEM_NOTICE,
};

use crate::{ClientHandle, HubError, Room};

/// Coordinates rooms and fans messages out to connected clients.
///
/// The hub lock only guards the room map; room state has its own lock, and
/// the two are never held together. Broadcast serializes an envelope once,
/// copies the target room's live-client list, and then enqueues
/// non-blocking — a full queue drops that recipient's frame and nothing
/// else.
pub struct Hub {
    codec: JsonCodec,
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            codec: JsonCodec,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a client to its room, creating the room on first join.
    ///
    /// The new client is sent the existing history (when there is any) and
    /// the whole room is notified of the join.
    pub fn register(&self, client: &ClientHandle) -> Result<Arc<Room>, HubError> {
        if client.room_id().is_empty() {
            return Err(HubError::RoomIdRequired);
        }

        let room = self.get_or_create_room(client.room_id());
        let participant = room.add_client(client);
        tracing::debug!(
            room_id = room.id(),
            client_id = client.id(),
            role = %client.role(),
            "client registered"
        );

        let (history, next_seq) = room.messages_since(0);
        if !history.is_empty() {
            self.unicast(client, history_envelope(room.id(), history, next_seq));
        }

        let notice = Envelope {
            cmd: CMD_SYSTEM_NOTICE.to_string(),
            r#type: CMD_SYSTEM_NOTICE.to_string(),
            room_id: room.id().to_string(),
            timestamp: Some(Utc::now()),
            content: format!(
                "{} ({}) 加入對話",
                participant.display_name, participant.role
            ),
            sender_id: client.id().to_string(),
            sender_role: client.role().to_string(),
            display_name: client.display_name().to_string(),
            ..Envelope::default()
        };
        self.broadcast(&room, notice);

        Ok(room)
    }

    /// Detaches a client and notifies the room. Unknown rooms are a no-op.
    pub fn unregister(&self, client: &ClientHandle) {
        if client.room_id().is_empty() {
            return;
        }
        let Some(room) = self.get_room(client.room_id()) else {
            return;
        };

        room.remove_client(client);
        tracing::debug!(
            room_id = room.id(),
            client_id = client.id(),
            "client unregistered"
        );

        let notice = Envelope {
            cmd: CMD_SYSTEM_NOTICE.to_string(),
            r#type: CMD_SYSTEM_NOTICE.to_string(),
            room_id: room.id().to_string(),
            timestamp: Some(Utc::now()),
            content: format!("{} 離開對話", client.display_name()),
            sender_id: client.id().to_string(),
            sender_role: client.role().to_string(),
            display_name: client.display_name().to_string(),
            ..Envelope::default()
        };
        self.broadcast(&room, notice);
    }

    /// Dispatches one inbound envelope from a client.
    ///
    /// Sender fields on the envelope are never trusted: whatever the peer
    /// claims is overwritten with the identity captured at connect time
    /// before anything leaves the hub.
    pub fn handle_incoming(
        &self,
        client: &ClientHandle,
        mut env: Envelope,
    ) -> Result<(), HubError> {
        let room = self
            .get_room(client.room_id())
            .ok_or(HubError::RoomNotFound)?;

        env.normalize();
        if env.timestamp.is_none() {
            env.timestamp = Some(Utc::now());
        }

        match env.cmd.as_str() {
            CMD_CHAT_MESSAGE => {
                if env.content.is_empty() {
                    return Err(HubError::ContentRequired);
                }

                let timestamp = env.timestamp.unwrap_or_else(Utc::now);
                let stored = room.add_message(ChatMessage {
                    room_id: client.room_id().to_string(),
                    sender_id: client.id().to_string(),
                    sender_role: client.role(),
                    display_name: client.display_name().to_string(),
                    content: env.content.clone(),
                    timestamp,
                    sequence: 0,
                    metadata: None,
                });

                env.room_id = client.room_id().to_string();
                stamp_sender(&mut env, client);
                env.timestamp = Some(stored.timestamp);
                env.seq = stored.sequence;
                env.ack = stored.sequence;
                self.broadcast(&room, env);
                Ok(())
            }

            CMD_CHAT_TYPING => {
                env.room_id = client.room_id().to_string();
                stamp_sender(&mut env, client);
                if let Some(ts) = env.timestamp {
                    room.touch(ts);
                }
                // Typing is transient: it consumes no sequence number, so
                // the ack points at the next chat message to come.
                env.ack = room.next_sequence();
                self.broadcast(&room, env);
                Ok(())
            }

            CMD_CHAT_HISTORY => {
                let mut since = env.seq;
                if since == 0 {
                    if let Some(value) =
                        env.metadata.as_ref().and_then(|m| m.get("since"))
                    {
                        if let Ok(parsed) = value.parse::<i64>() {
                            since = parsed;
                        }
                    }
                }

                let (history, next_seq) = room.messages_since(since);
                let mut response = history_envelope(room.id(), history, next_seq);
                response.timestamp = env.timestamp;
                // History goes to the requester alone, never the room.
                self.unicast(client, response);
                Ok(())
            }

            other => Err(HubError::UnknownMessage(other.to_string())),
        }
    }

    /// All room summaries, most recently active first.
    pub fn rooms(&self) -> Vec<RoomSummary> {
        let rooms: Vec<Arc<Room>> = self.rooms.read().values().cloned().collect();
        let mut summaries: Vec<RoomSummary> =
            rooms.iter().map(|room| room.summary()).collect();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        summaries
    }

    pub fn room_snapshot(&self, room_id: &str) -> Result<RoomSnapshot, HubError> {
        self.get_room(room_id)
            .map(|room| room.snapshot())
            .ok_or(HubError::RoomNotFound)
    }

    /// Chat history newer than `sequence` plus the room's current counter.
    pub fn messages_since(
        &self,
        room_id: &str,
        sequence: i64,
    ) -> Result<(Vec<ChatMessage>, i64), HubError> {
        self.get_room(room_id)
            .map(|room| room.messages_since(sequence))
            .ok_or(HubError::RoomNotFound)
    }

    /// Assigns an agent to a room and notifies its clients.
    ///
    /// When the agent is currently online somewhere, their live display
    /// name wins over the caller-supplied one. Assignment works without a
    /// live connection so admins can pre-route rooms.
    pub fn assign_agent(
        &self,
        room_id: &str,
        agent_id: &str,
        display_name: &str,
    ) -> Result<Participant, HubError> {
        let room = self.get_room(room_id).ok_or(HubError::RoomNotFound)?;

        let mut display_name = display_name.to_string();
        if let Some(presence) = self
            .online_agents()
            .into_iter()
            .find(|agent| agent.id == agent_id)
        {
            if !presence.display_name.is_empty() {
                display_name = presence.display_name;
            }
        }

        room.set_assigned_agent(agent_id, &display_name);
        let assigned = room
            .assigned_agent()
            .expect("assignment was just recorded");
        tracing::info!(room_id, agent_id, "agent assigned");

        let notice = Envelope {
            cmd: CMD_SYSTEM_NOTICE.to_string(),
            r#type: CMD_SYSTEM_NOTICE.to_string(),
            room_id: room_id.to_string(),
            timestamp: Some(Utc::now()),
            content: format!("客服 {display_name} 將協助這個對話"),
            sender_id: agent_id.to_string(),
            sender_role: Role::Agent.to_string(),
            display_name: display_name.clone(),
            metadata: Some(HashMap::from([
                ("assignedAgent".to_string(), display_name),
                ("assignedAgentId".to_string(), agent_id.to_string()),
            ])),
            ..Envelope::default()
        };
        self.broadcast(&room, notice);

        Ok(assigned)
    }

    /// Unique connected agents across all rooms, merged by agent id:
    /// room lists are unioned, `last_seen` is the maximum, and the
    /// first-seen display name is kept. Sorted by display name, then id.
    pub fn online_agents(&self) -> Vec<AgentPresence> {
        let rooms: Vec<Arc<Room>> = self.rooms.read().values().cloned().collect();

        let mut catalog: HashMap<String, AgentPresence> = HashMap::new();
        for room in &rooms {
            for agent in room.agent_participants() {
                if !agent.connected {
                    continue;
                }
                let entry = catalog
                    .entry(agent.id.clone())
                    .or_insert_with(|| AgentPresence {
                        id: agent.id.clone(),
                        display_name: agent.display_name.clone(),
                        rooms: Vec::new(),
                        last_seen: agent.last_seen,
                    });
                entry.rooms.push(room.id().to_string());
                if agent.last_seen > entry.last_seen {
                    entry.last_seen = agent.last_seen;
                }
            }
        }

        let mut presences: Vec<AgentPresence> = catalog.into_values().collect();
        presences.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        presences
    }

    /// Serializes an envelope and enqueues it for a single client.
    ///
    /// Returns `false` when the frame could not be enqueued (full or closed
    /// queue, encode failure); callers never block on delivery.
    pub fn unicast(&self, client: &ClientHandle, env: Envelope) -> bool {
        match self.encode(env) {
            Some(frame) => client.try_send(frame),
            None => false,
        }
    }

    fn broadcast(&self, room: &Room, env: Envelope) {
        let Some(frame) = self.encode(env) else {
            return;
        };

        // The client list is copied under the room lock; enqueueing happens
        // after release and never blocks.
        for client in room.clients() {
            if !client.try_send(frame.clone()) {
                tracing::trace!(
                    room_id = room.id(),
                    client_id = client.id(),
                    "outbound queue full, frame dropped"
                );
            }
        }
    }

    /// Normalizes, stamps a missing timestamp, and serializes exactly once.
    fn encode(&self, mut env: Envelope) -> Option<Bytes> {
        env.normalize();
        if env.timestamp.is_none() {
            env.timestamp = Some(Utc::now());
        }
        match self.codec.encode(&env) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode envelope");
                None
            }
        }
    }

    fn get_or_create_room(&self, room_id: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.read().get(room_id) {
            return Arc::clone(room);
        }

        let mut rooms = self.rooms.write();
        Arc::clone(rooms.entry(room_id.to_string()).or_insert_with(|| {
            tracing::info!(room_id, "room created");
            Arc::new(Room::new(room_id))
        }))
    }

    fn get_room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.read().get(room_id).cloned()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a `chat.history` envelope with the legacy payload duplicate that
/// older clients read (`payload.messages` / `payload.nextSeq`).
fn history_envelope(room_id: &str, history: Vec<ChatMessage>, next_seq: i64) -> Envelope {
    let payload = serde_json::json!({
        "messages": &history,
        "nextSeq": next_seq,
    });

    Envelope {
        cmd: CMD_CHAT_HISTORY.to_string(),
        r#type: CMD_CHAT_HISTORY.to_string(),
        room_id: room_id.to_string(),
        timestamp: Some(Utc::now()),
        history: Some(history),
        seq: next_seq,
        ack: next_seq,
        payload: Some(payload),
        ..Envelope::default()
    }
}

/// The trust boundary: outbound sender fields always come from the
/// authenticated connection, never from the inbound envelope.
fn stamp_sender(env: &mut Envelope, client: &ClientHandle) {
    env.sender_id = client.id().to_string();
    env.sender_role = client.role().to_string();
    env.display_name = client.display_name().to_string();
}
