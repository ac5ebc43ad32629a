use std::fmt;

use bytes::Bytes;

use crate::error::{FrameError, Result};

/// Largest payload a single packet can carry.
pub const MAX_PACKET: usize = 255;

/// Leading token of a protocol line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Reset,
    Packet,
    Ack,
    Error,
    Connect,
    Disconnect,
}

impl Directive {
    /// Match a token against the case-sensitive directive names.
    pub fn from_token(token: &[u8]) -> Option<Self> {
        match token {
            b"RST" => Some(Directive::Reset),
            b"PKT" => Some(Directive::Packet),
            b"ACK" => Some(Directive::Ack),
            b"ERR" => Some(Directive::Error),
            b"CONN" => Some(Directive::Connect),
            b"DISC" => Some(Directive::Disconnect),
            _ => None,
        }
    }

    /// Wire spelling of the directive.
    pub fn as_str(self) -> &'static str {
        match self {
            Directive::Reset => "RST",
            Directive::Packet => "PKT",
            Directive::Ack => "ACK",
            Directive::Error => "ERR",
            Directive::Connect => "CONN",
            Directive::Disconnect => "DISC",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Packet payload of 1 to [`MAX_PACKET`] bytes.
///
/// The length is derived from the payload itself, so the declared length and
/// the carried bytes cannot disagree.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    data: Bytes,
}

impl Packet {
    /// Wrap a payload, rejecting empty or oversized data.
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.is_empty() || data.len() > MAX_PACKET {
            return Err(FrameError::InvalidPacket { len: data.len() });
        }
        Ok(Self { data })
    }

    /// Declared payload length as carried on the wire.
    pub fn len(&self) -> u8 {
        // `new` guarantees 1..=255
        self.data.len() as u8
    }

    /// Never true for a constructed packet.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload bytes, without the length header.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the packet and return its payload.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("len", &self.data.len())
            .field("data", &self.data.as_ref())
            .finish()
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Opaque unique device identifier announced with a connect notice.
///
/// Its structure is not defined by the protocol; it is carried but never
/// rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Udid(Bytes);

impl Udid {
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self(raw.into())
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// One directive exchanged with the supervisor.
///
/// `SendPacket` doubles as the inbound send request and the outbound incoming
/// packet event; the remaining address-carrying variants are outbound events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reset,
    SendPacket { addr: u8, packet: Packet },
    Ack { addr: u8 },
    Error { addr: u8 },
    Connect { addr: u8, udid: Udid },
    Disconnect { addr: u8 },
}

impl Command {
    /// Leading token this command is rendered with.
    pub fn directive(&self) -> Directive {
        match self {
            Command::Reset => Directive::Reset,
            Command::SendPacket { .. } => Directive::Packet,
            Command::Ack { .. } => Directive::Ack,
            Command::Error { .. } => Directive::Error,
            Command::Connect { .. } => Directive::Connect,
            Command::Disconnect { .. } => Directive::Disconnect,
        }
    }

    /// Slave address carried by the command, if any.
    pub fn addr(&self) -> Option<u8> {
        match self {
            Command::Reset => None,
            Command::SendPacket { addr, .. }
            | Command::Ack { addr }
            | Command::Error { addr }
            | Command::Connect { addr, .. }
            | Command::Disconnect { addr } => Some(*addr),
        }
    }

    /// Payload of a `SendPacket`.
    pub fn packet(&self) -> Option<&Packet> {
        match self {
            Command::SendPacket { packet, .. } => Some(packet),
            _ => None,
        }
    }

    /// Identifier announced by a `Connect`.
    pub fn udid(&self) -> Option<&Udid> {
        match self {
            Command::Connect { udid, .. } => Some(udid),
            _ => None,
        }
    }
}
