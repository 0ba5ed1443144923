//! Per-connection pumps: the bridge between one frame codec and the hub.
//!
//! Each accepted upgrade produces a [`Client`] with exactly two tasks. The
//! read pump decodes inbound envelopes and hands them to the hub; the write
//! pump drains the bounded outbound queue and keeps the connection alive
//! with periodic pings. Nothing else touches the socket.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use parlor_protocol::{Envelope, Role, CMD_SYSTEM_NOTICE};
use parlor_room::{ClientHandle, Hub};
use parlor_ws::{
    is_unexpected_close, MessageConn, MessageReader, MessageWriter, Opcode,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};

/// Deadline for a single outbound frame write.
const WRITE_WAIT: Duration = Duration::from_secs(10);
/// How long a connection may stay silent before the reader gives up.
/// Extended every time the peer answers a ping.
const PONG_WAIT: Duration = Duration::from_secs(60);
/// Ping cadence; must stay under `PONG_WAIT` so the deadline keeps moving.
const PING_PERIOD: Duration = Duration::from_secs(54);
/// Maximum accepted inbound payload.
const MAX_MESSAGE_SIZE: usize = 8192;
/// Outbound queue length. Broadcasts beyond this are dropped, not queued.
const OUTBOUND_QUEUE: usize = 16;

/// One live WebSocket connection bound to a hub registration.
pub struct Client<S> {
    hub: Arc<Hub>,
    handle: ClientHandle,
    reader: MessageReader<S>,
    writer: MessageWriter<S>,
    outbound: mpsc::Receiver<Bytes>,
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(
        hub: Arc<Hub>,
        conn: MessageConn<S>,
        room_id: impl Into<String>,
        id: impl Into<String>,
        role: Role,
        display_name: impl Into<String>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let handle = ClientHandle::new(room_id, id, role, display_name, tx);
        let (reader, mut writer) = conn.split();
        writer.set_write_timeout(Some(WRITE_WAIT));

        Self {
            hub,
            handle,
            reader,
            writer,
            outbound: rx,
        }
    }

    /// Registers with the hub and runs both pumps until the connection
    /// dies, then unregisters and tears everything down.
    pub async fn run(self) {
        let Self {
            hub,
            handle,
            mut reader,
            writer,
            outbound,
        } = self;

        if let Err(err) = hub.register(&handle) {
            tracing::debug!(client_id = handle.id(), error = %err, "registration rejected");
            let _ = writer.write_message(Opcode::Close, &[]).await;
            let _ = writer.shutdown().await;
            return;
        }

        let write_task = tokio::spawn(write_pump(writer, outbound));
        read_pump(&hub, &handle, &mut reader).await;

        hub.unregister(&handle);
        // Dropping the last queue sender closes the outbound channel; the
        // write pump drains what is left, sends a close frame, and exits.
        drop(handle);
        drop(reader);
        let _ = write_task.await;
    }
}

async fn read_pump<S>(hub: &Hub, handle: &ClientHandle, reader: &mut MessageReader<S>)
where
    S: AsyncRead + AsyncWrite,
{
    reader.set_read_limit(MAX_MESSAGE_SIZE);
    reader.set_read_deadline(Instant::now() + PONG_WAIT);
    reader.on_pong(|_| Some(Instant::now() + PONG_WAIT));

    loop {
        let data = match reader.read_message().await {
            Ok((_, data)) => data,
            Err(err) => {
                if is_unexpected_close(&err, &[]) {
                    tracing::warn!(
                        client_id = handle.id(),
                        error = %err,
                        "websocket closed unexpectedly"
                    );
                }
                break;
            }
        };

        let mut envelope: Envelope = match serde_json::from_slice(&data) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(client_id = handle.id(), error = %err, "undecodable frame");
                send_notice(hub, handle, "格式錯誤，請重新傳送");
                continue;
            }
        };

        envelope.normalize();
        if let Err(err) = hub.handle_incoming(handle, envelope) {
            send_notice(hub, handle, &err.to_string());
        }
    }
}

async fn write_pump<S>(writer: MessageWriter<S>, mut outbound: mpsc::Receiver<Bytes>)
where
    S: AsyncRead + AsyncWrite,
{
    let mut pings = time::interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(err) = writer.write_message(Opcode::Text, &frame).await {
                        tracing::debug!(error = %err, "write failed");
                        break;
                    }
                }
                None => {
                    let _ = writer.write_message(Opcode::Close, &[]).await;
                    break;
                }
            },
            _ = pings.tick() => {
                if writer.write_message(Opcode::Ping, &[]).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = writer.shutdown().await;
}

/// Errors from one client's decode or dispatch go back to that client
/// alone, as a `system.notice`.
fn send_notice(hub: &Hub, handle: &ClientHandle, content: &str) {
    let notice = Envelope {
        cmd: CMD_SYSTEM_NOTICE.to_string(),
        r#type: CMD_SYSTEM_NOTICE.to_string(),
        room_id: handle.room_id().to_string(),
        timestamp: Some(Utc::now()),
        content: content.to_string(),
        ..Envelope::default()
    };
    hub.unicast(handle, notice);
}
