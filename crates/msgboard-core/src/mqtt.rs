//! Minimal MQTT 3.1.1 client
//!
//! Only what a single-topic status display needs: a clean-session CONNECT,
//! one QoS 0 SUBSCRIBE, QoS 0 PUBLISH, keep-alive pings (with a DISCONNECT
//! once a ping goes unanswered) and inbound PUBLISH decoding. [`MqttClient`] implements [`Transport`] on top of any byte
//! stream implementing [`Connection`].
//!
//! # Framing
//!
//! Every packet is a one-byte header (type in the high nibble, flags in the
//! low nibble), a variable-length "remaining length" (7 bits per byte,
//! high bit = continuation, at most 4 bytes), then the body.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::future::Future;

use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::link::{LinkError, Transport};

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 9;
const PINGREQ: [u8; 2] = [0xC0, 0x00];
const PINGRESP: u8 = 13;
const DISCONNECT: [u8; 2] = [0xE0, 0x00];

/// Protocol level 4 = MQTT 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;
const CLEAN_SESSION: u8 = 0x02;
const SUBACK_FAILURE: u8 = 0x80;

/// Largest remaining length the client will buffer.
pub const MAX_PACKET_LEN: usize = 4096;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttError {
    #[error("Malformed packet")]
    Malformed,
    #[error("Unexpected packet type {0}")]
    UnexpectedPacket(u8),
    #[error("Packet exceeds the receive buffer")]
    BufferTooSmall,
}

impl From<MqttError> for LinkError {
    fn from(_: MqttError) -> Self {
        LinkError::Protocol
    }
}

/// Decoded inbound packet borrowing from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    ConnAck {
        session_present: bool,
        return_code: u8,
    },
    SubAck {
        packet_id: u16,
        return_code: u8,
    },
    Publish {
        topic: &'a str,
        packet_id: Option<u16>,
        payload: &'a [u8],
    },
    PingResp,
    Other(u8),
}

fn encode_remaining_length(mut len: usize, out: &mut Vec<u8>) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
}

/// Decode a remaining length: `Ok(None)` if more bytes are needed,
/// otherwise the value and how many bytes it occupied.
fn decode_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, MqttError> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, byte) in buf.iter().enumerate() {
        if i == 4 {
            return Err(MqttError::Malformed);
        }
        value += (*byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }
    if buf.len() >= 4 {
        Err(MqttError::Malformed)
    } else {
        Ok(None)
    }
}

fn push_str(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn finish(header: u8, body: &[u8], out: &mut Vec<u8>) {
    out.push(header);
    encode_remaining_length(body.len(), out);
    out.extend_from_slice(body);
}

/// CONNECT with a clean session and no credentials.
pub fn encode_connect(client_id: &str, keep_alive_secs: u16, out: &mut Vec<u8>) {
    let mut body = Vec::with_capacity(12 + client_id.len());
    push_str("MQTT", &mut body);
    body.push(PROTOCOL_LEVEL);
    body.push(CLEAN_SESSION);
    body.extend_from_slice(&keep_alive_secs.to_be_bytes());
    push_str(client_id, &mut body);
    finish(CONNECT, &body, out);
}

/// SUBSCRIBE to a single topic at QoS 0.
pub fn encode_subscribe(packet_id: u16, topic: &str, out: &mut Vec<u8>) {
    let mut body = Vec::with_capacity(5 + topic.len());
    body.extend_from_slice(&packet_id.to_be_bytes());
    push_str(topic, &mut body);
    body.push(0);
    finish(SUBSCRIBE, &body, out);
}

/// QoS 0 PUBLISH, not retained.
pub fn encode_publish(topic: &str, payload: &[u8], out: &mut Vec<u8>) {
    let mut body = Vec::with_capacity(2 + topic.len() + payload.len());
    push_str(topic, &mut body);
    body.extend_from_slice(payload);
    finish(PUBLISH << 4, &body, out);
}

pub fn encode_pingreq(out: &mut Vec<u8>) {
    out.extend_from_slice(&PINGREQ);
}

pub fn encode_disconnect(out: &mut Vec<u8>) {
    out.extend_from_slice(&DISCONNECT);
}

fn read_u16(buf: &[u8], at: usize) -> Result<u16, MqttError> {
    buf.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(MqttError::Malformed)
}

/// Decode one packet from the front of `buf`.
///
/// Returns `Ok(None)` while the packet is incomplete, otherwise the packet
/// and the number of bytes it occupied.
pub fn decode(buf: &[u8]) -> Result<Option<(Packet<'_>, usize)>, MqttError> {
    let Some(&header) = buf.first() else {
        return Ok(None);
    };
    let Some((len, len_bytes)) = decode_remaining_length(&buf[1..])? else {
        return Ok(None);
    };
    if len > MAX_PACKET_LEN {
        return Err(MqttError::BufferTooSmall);
    }
    let start = 1 + len_bytes;
    let total = start + len;
    if buf.len() < total {
        return Ok(None);
    }
    let body = &buf[start..total];

    let packet = match header >> 4 {
        CONNACK => {
            if body.len() != 2 {
                return Err(MqttError::Malformed);
            }
            Packet::ConnAck {
                session_present: body[0] & 0x01 != 0,
                return_code: body[1],
            }
        }
        SUBACK => {
            let packet_id = read_u16(body, 0)?;
            let return_code = *body.get(2).ok_or(MqttError::Malformed)?;
            Packet::SubAck {
                packet_id,
                return_code,
            }
        }
        PUBLISH => {
            let qos = (header >> 1) & 0x03;
            let topic_len = read_u16(body, 0)? as usize;
            let topic_bytes = body.get(2..2 + topic_len).ok_or(MqttError::Malformed)?;
            let topic = core::str::from_utf8(topic_bytes).map_err(|_| MqttError::Malformed)?;
            let mut at = 2 + topic_len;
            let packet_id = if qos > 0 {
                let id = read_u16(body, at)?;
                at += 2;
                Some(id)
            } else {
                None
            };
            Packet::Publish {
                topic,
                packet_id,
                payload: &body[at..],
            }
        }
        PINGRESP => Packet::PingResp,
        other => Packet::Other(other),
    };
    Ok(Some((packet, total)))
}

/// Byte stream to the broker.
pub trait Connection {
    /// Open (or reopen) the underlying socket.
    fn open(&mut self) -> impl Future<Output = Result<(), LinkError>>;

    fn close(&mut self);

    /// True if a read would return without waiting.
    fn read_ready(&self) -> bool;

    /// Read at least one byte; `Ok(0)` means the peer closed the stream.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, LinkError>>;

    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = Result<(), LinkError>>;
}

/// Owned form of the packets the client reacts to.
enum Incoming {
    ConnAck(u8),
    SubAck(u16, u8),
    Publish(Vec<u8>),
    PingResp,
    Ignored,
}

/// Single-topic MQTT session over a [`Connection`].
pub struct MqttClient<C: Connection> {
    conn: C,
    connected: bool,
    keep_alive_secs: u16,
    next_packet_id: u16,
    rx: Vec<u8>,
    tx: Vec<u8>,
    pending: VecDeque<Vec<u8>>,
    last_now_ms: u64,
    last_tx_ms: u64,
    ping_sent_ms: Option<u64>,
}

impl<C: Connection> MqttClient<C> {
    pub fn new(conn: C, keep_alive_secs: u16) -> Self {
        Self {
            conn,
            connected: false,
            keep_alive_secs,
            next_packet_id: 1,
            rx: Vec::new(),
            tx: Vec::new(),
            pending: VecDeque::new(),
            last_now_ms: 0,
            last_tx_ms: 0,
            ping_sent_ms: None,
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Send DISCONNECT and close the socket.
    async fn disconnect(&mut self) {
        if self.connected {
            self.tx.clear();
            encode_disconnect(&mut self.tx);
            let _ = self.conn.write_all(&self.tx).await;
        }
        self.drop_session();
    }

    fn drop_session(&mut self) {
        self.connected = false;
        self.ping_sent_ms = None;
        self.rx.clear();
        self.conn.close();
    }

    fn fail(&mut self, error: LinkError) -> LinkError {
        warn!("MQTT session dropped: {}", error);
        self.drop_session();
        error
    }

    async fn send(&mut self) -> Result<(), LinkError> {
        match self.conn.write_all(&self.tx).await {
            Ok(()) => {
                self.last_tx_ms = self.last_now_ms;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Pull one packet out of the receive buffer, if complete.
    fn take_packet(&mut self) -> Result<Option<Incoming>, MqttError> {
        let Some((packet, used)) = decode(&self.rx)? else {
            return Ok(None);
        };
        let incoming = match packet {
            Packet::ConnAck { return_code, .. } => Incoming::ConnAck(return_code),
            Packet::SubAck {
                packet_id,
                return_code,
            } => Incoming::SubAck(packet_id, return_code),
            Packet::Publish { payload, .. } => Incoming::Publish(payload.to_vec()),
            Packet::PingResp => Incoming::PingResp,
            Packet::Other(kind) => {
                debug!("Ignoring MQTT packet type {}", kind);
                Incoming::Ignored
            }
        };
        self.rx.drain(..used);
        Ok(Some(incoming))
    }

    /// Read until a full packet is available.
    async fn read_packet(&mut self) -> Result<Incoming, LinkError> {
        let mut chunk = [0u8; 128];
        loop {
            match self.take_packet() {
                Ok(Some(packet)) => return Ok(packet),
                Ok(None) => {}
                Err(e) => return Err(self.fail(e.into())),
            }
            let n = match self.conn.read(&mut chunk).await {
                Ok(0) => return Err(self.fail(LinkError::ConnectionLost)),
                Ok(n) => n,
                Err(e) => return Err(self.fail(e)),
            };
            self.rx.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read whatever is available without waiting.
    async fn fill_ready(&mut self) -> Result<(), LinkError> {
        let mut chunk = [0u8; 128];
        while self.conn.read_ready() {
            match self.conn.read(&mut chunk).await {
                Ok(0) => return Err(self.fail(LinkError::ConnectionLost)),
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(e) => return Err(self.fail(e)),
            }
        }
        Ok(())
    }

    fn keep_alive_ms(&self) -> u64 {
        self.keep_alive_secs as u64 * 1000
    }

    async fn service_keep_alive(&mut self, now_ms: u64) -> Result<(), LinkError> {
        if self.keep_alive_secs == 0 {
            return Ok(());
        }
        if let Some(sent) = self.ping_sent_ms {
            if now_ms.saturating_sub(sent) > self.keep_alive_ms() {
                warn!("MQTT ping unanswered for {} ms", now_ms.saturating_sub(sent));
                self.disconnect().await;
                return Err(LinkError::Timeout);
            }
        } else if now_ms.saturating_sub(self.last_tx_ms) >= self.keep_alive_ms() / 2 {
            self.tx.clear();
            encode_pingreq(&mut self.tx);
            self.send().await?;
            self.ping_sent_ms = Some(now_ms);
        }
        Ok(())
    }
}

impl<C: Connection> Transport for MqttClient<C> {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, client_id: &str) -> Result<(), LinkError> {
        self.drop_session();
        self.pending.clear();
        self.conn.open().await?;

        self.tx.clear();
        encode_connect(client_id, self.keep_alive_secs, &mut self.tx);
        self.send().await?;

        match self.read_packet().await? {
            Incoming::ConnAck(0) => {
                info!("MQTT connected as {}", client_id);
                self.connected = true;
                self.last_tx_ms = self.last_now_ms;
                Ok(())
            }
            Incoming::ConnAck(code) => Err(self.fail(LinkError::Refused(code))),
            _ => Err(self.fail(LinkError::Protocol)),
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        let packet_id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);

        self.tx.clear();
        encode_subscribe(packet_id, topic, &mut self.tx);
        self.send().await?;

        loop {
            match self.read_packet().await? {
                Incoming::SubAck(id, code) if id == packet_id => {
                    if code == SUBACK_FAILURE {
                        return Err(self.fail(LinkError::Refused(code)));
                    }
                    info!("Subscribed to {}", topic);
                    return Ok(());
                }
                Incoming::Publish(payload) => self.pending.push_back(payload),
                Incoming::PingResp => self.ping_sent_ms = None,
                _ => {}
            }
        }
    }

    async fn poll(&mut self, now_ms: u64) -> Result<Option<Vec<u8>>, LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        self.last_now_ms = now_ms;
        if let Some(payload) = self.pending.pop_front() {
            return Ok(Some(payload));
        }

        self.service_keep_alive(now_ms).await?;
        self.fill_ready().await?;

        loop {
            match self.take_packet() {
                Ok(Some(Incoming::Publish(payload))) => return Ok(Some(payload)),
                Ok(Some(Incoming::PingResp)) => self.ping_sent_ms = None,
                Ok(Some(_)) => {}
                Ok(None) => return Ok(None),
                Err(e) => return Err(self.fail(e.into())),
            }
        }
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        self.tx.clear();
        encode_publish(topic, payload, &mut self.tx);
        self.send().await
    }
}
