//! The frame codec: message-oriented reads and writes over a raw stream.
//!
//! A [`MessageConn`] wraps any `AsyncRead + AsyncWrite` stream (an upgraded
//! HTTP connection in production, an in-memory duplex in tests) and splits
//! into a reader and a writer so the two connection tasks can run
//! independently. The writer is cheaply cloneable and serializes frames
//! under a mutex, so a keepalive pinger and a message writer can never
//! interleave bytes of two frames.

use std::sync::Arc;

use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::sync::Mutex;
use tokio::time::{self, Duration, Instant};

use crate::WsError;

/// Frame opcodes from RFC 6455 §5.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

/// The kind of a complete data message returned by
/// [`MessageReader::read_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

/// Called when a pong control frame arrives. Returning `Some` installs a
/// new read deadline, which is how keepalive extends an idle connection.
type PongHandler = Box<dyn FnMut(&[u8]) -> Option<Instant> + Send>;

/// A message-oriented WebSocket connection over a raw byte stream.
pub struct MessageConn<S> {
    reader: MessageReader<S>,
    writer: MessageWriter<S>,
}

impl<S: AsyncRead + AsyncWrite> MessageConn<S> {
    pub fn new(io: S) -> Self {
        let (read_half, write_half) = tokio::io::split(io);
        let writer = MessageWriter {
            io: Arc::new(Mutex::new(write_half)),
            write_timeout: None,
        };
        let reader = MessageReader {
            io: BufReader::new(read_half),
            writer: writer.clone(),
            read_limit: 0,
            deadline: None,
            on_pong: None,
        };
        Self { reader, writer }
    }

    /// Splits into independently owned read and write sides.
    pub fn split(self) -> (MessageReader<S>, MessageWriter<S>) {
        (self.reader, self.writer)
    }
}

/// The read side of a connection. Owns the read deadline, the payload
/// limit, and the pong handler; replies to pings through the shared writer.
pub struct MessageReader<S> {
    io: BufReader<ReadHalf<S>>,
    writer: MessageWriter<S>,
    read_limit: usize,
    deadline: Option<Instant>,
    on_pong: Option<PongHandler>,
}

impl<S: AsyncRead + AsyncWrite> MessageReader<S> {
    /// Sets the maximum accepted payload size. Zero means unlimited.
    pub fn set_read_limit(&mut self, limit: usize) {
        self.read_limit = limit;
    }

    /// Sets the absolute deadline applied to every subsequent frame read.
    pub fn set_read_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Installs the pong handler. A returned `Instant` replaces the read
    /// deadline.
    pub fn on_pong(&mut self, handler: impl FnMut(&[u8]) -> Option<Instant> + Send + 'static) {
        self.on_pong = Some(Box::new(handler));
    }

    /// Reads frames until a text or binary message arrives.
    ///
    /// Control frames are handled inline: pings are answered with a pong
    /// carrying the same payload, pongs run the installed handler, and a
    /// close frame surfaces as [`WsError::Closed`].
    pub async fn read_message(&mut self) -> Result<(MessageKind, Vec<u8>), WsError> {
        loop {
            let (opcode, payload) = self.read_frame().await?;
            match opcode {
                0x1 => return Ok((MessageKind::Text, payload)),
                0x2 => return Ok((MessageKind::Binary, payload)),
                0x8 => {
                    let (code, reason) = parse_close_payload(&payload);
                    return Err(WsError::Closed { code, reason });
                }
                0x9 => {
                    // A failed pong write will resurface as a read error on
                    // the next frame.
                    let _ = self.writer.write_message(Opcode::Pong, &payload).await;
                }
                0xA => {
                    if let Some(handler) = self.on_pong.as_mut() {
                        if let Some(deadline) = handler(&payload) {
                            self.deadline = Some(deadline);
                        }
                    }
                }
                _ => return Err(WsError::UnsupportedData),
            }
        }
    }

    async fn read_frame(&mut self) -> Result<(u8, Vec<u8>), WsError> {
        let mut header = [0u8; 2];
        self.read_full(&mut header).await?;

        let fin = header[0] & 0x80 != 0;
        let opcode = header[0] & 0x0F;
        let masked = header[1] & 0x80 != 0;
        let mut payload_len = u64::from(header[1] & 0x7F);

        if !fin {
            return Err(WsError::UnsupportedData);
        }

        // Extended payload length, big-endian.
        match payload_len {
            126 => {
                let mut ext = [0u8; 2];
                self.read_full(&mut ext).await?;
                payload_len = u64::from(u16::from_be_bytes(ext));
            }
            127 => {
                let mut ext = [0u8; 8];
                self.read_full(&mut ext).await?;
                payload_len = u64::from_be_bytes(ext);
            }
            _ => {}
        }

        if self.read_limit > 0 && payload_len > self.read_limit as u64 {
            return Err(WsError::TooLarge(payload_len as usize));
        }

        if !masked {
            return Err(WsError::Unmasked);
        }
        let mut mask = [0u8; 4];
        self.read_full(&mut mask).await?;

        let mut payload = vec![0u8; payload_len as usize];
        self.read_full(&mut payload).await?;
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }

        Ok((opcode, payload))
    }

    async fn read_full(&mut self, buf: &mut [u8]) -> Result<(), WsError> {
        match self.deadline {
            Some(deadline) => match time::timeout_at(deadline, self.io.read_exact(buf)).await {
                Ok(result) => {
                    result?;
                    Ok(())
                }
                Err(_) => Err(WsError::Timeout),
            },
            None => {
                self.io.read_exact(buf).await?;
                Ok(())
            }
        }
    }
}

/// The write side of a connection. Clones share one underlying write half;
/// every frame is written whole under the mutex.
pub struct MessageWriter<S> {
    io: Arc<Mutex<WriteHalf<S>>>,
    write_timeout: Option<Duration>,
}

impl<S> Clone for MessageWriter<S> {
    fn clone(&self) -> Self {
        Self {
            io: Arc::clone(&self.io),
            write_timeout: self.write_timeout,
        }
    }
}

impl<S: AsyncWrite> MessageWriter<S> {
    /// Sets the timeout applied to each subsequent write.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.write_timeout = timeout;
    }

    /// Writes one complete frame with FIN set. Server frames are unmasked.
    pub async fn write_message(&self, opcode: Opcode, payload: &[u8]) -> Result<(), WsError> {
        let frame = encode_frame(opcode, payload);
        let mut io = self.io.lock().await;
        match self.write_timeout {
            Some(wait) => time::timeout(wait, write_all_flush(&mut *io, &frame))
                .await
                .map_err(|_| WsError::Timeout)?,
            None => write_all_flush(&mut *io, &frame).await,
        }
    }

    /// Shuts down the underlying stream.
    pub async fn shutdown(&self) -> Result<(), WsError> {
        let mut io = self.io.lock().await;
        io.shutdown().await?;
        Ok(())
    }
}

async fn write_all_flush<W: AsyncWrite + Unpin>(io: &mut W, frame: &[u8]) -> Result<(), WsError> {
    io.write_all(frame).await?;
    io.flush().await?;
    Ok(())
}

fn encode_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 10);
    frame.push(0x80 | opcode as u8);

    let len = payload.len();
    if len <= 125 {
        frame.push(len as u8);
    } else if len <= 65535 {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    frame.extend_from_slice(payload);
    frame
}

fn parse_close_payload(payload: &[u8]) -> (u16, String) {
    if payload.len() >= 2 {
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
        (code, reason)
    } else {
        (crate::CLOSE_NORMAL, String::new())
    }
}
