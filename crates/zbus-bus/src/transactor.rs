use std::io;

use bytes::Bytes;
use tracing::{debug, info};
use zbus_frame::{Command, EventSink, Packet, MAX_PACKET};

use crate::error::{BusError, Result};
use crate::i2c::{I2cBus, I2cMessage};

/// Reserved configuration address; the reset command is sent here.
pub const CONF_ADDR: u16 = 0x76;

/// Reserved poll address; answers with `(slave, len)` of the pending packet.
pub const POLL_ADDR: u16 = 0x77;

/// Single-byte command written to [`CONF_ADDR`] to reset the bus.
pub const RESET_COMMAND: u8 = 0x00;

const POLL_HEADER_LEN: usize = 2;
const TRAILER_LEN: usize = 1;

/// A packet fetched by [`BusTransactor::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledPacket {
    pub addr: u8,
    pub packet: Packet,
    /// Trailing integrity byte as sent by the slave. Not validated.
    pub trailer: u8,
}

impl PolledPacket {
    /// The PKT event announcing this packet to the supervisor.
    pub fn into_command(self) -> Command {
        Command::SendPacket {
            addr: self.addr,
            packet: self.packet,
        }
    }
}

/// Performs the addressed exchanges of the ZEN-bus protocol on an [`I2cBus`].
///
/// No transaction is retried; a failure is reported once and the bus is
/// assumed usable for the next call.
pub struct BusTransactor<B> {
    bus: B,
    /// Length prefix plus the largest payload.
    buf: [u8; MAX_PACKET + 1],
}

#[cfg(target_os = "linux")]
impl BusTransactor<crate::i2c::I2cDevice> {
    /// Open adapter `bus_num` and confirm it can do addressed transfers.
    pub fn open(bus_num: u32) -> Result<Self> {
        crate::i2c::I2cDevice::open_bus(bus_num).map(Self::new)
    }
}

impl<B: I2cBus> BusTransactor<B> {
    /// Wrap an already-open bus.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            buf: [0; MAX_PACKET + 1],
        }
    }

    /// Send the reset command to the configuration address.
    pub fn reset(&mut self) -> Result<()> {
        let data = [RESET_COMMAND];
        self.bus
            .transfer(&mut [I2cMessage::Write {
                addr: CONF_ADDR,
                data: &data,
            }])
            .map_err(|source| BusError::Transaction { addr: None, source })?;
        info!("bus reset");
        Ok(())
    }

    /// Write `data` to `addr`, prefixed by its one-byte length, and emit an
    /// ACK for `addr` once the slave has taken it.
    pub fn send<S: EventSink + ?Sized>(
        &mut self,
        addr: u8,
        data: &[u8],
        events: &mut S,
    ) -> Result<()> {
        if data.is_empty() || data.len() > MAX_PACKET {
            return Err(BusError::InvalidArgument(format!(
                "packet length {} out of range (1..={MAX_PACKET})",
                data.len()
            )));
        }

        let len = data.len();
        self.buf[0] = len as u8;
        self.buf[1..=len].copy_from_slice(data);

        self.bus
            .transfer(&mut [I2cMessage::Write {
                addr: u16::from(addr),
                data: &self.buf[..=len],
            }])
            .map_err(|source| BusError::Transaction {
                addr: Some(addr),
                source,
            })?;
        debug!(addr, len, "packet sent");

        events.emit(Command::Ack { addr })?;
        Ok(())
    }

    /// Fetch the pending packet of whichever slave raised the alert.
    ///
    /// Phase one reads `(slave, len)` from [`POLL_ADDR`]; phase two reads
    /// `len` payload bytes plus one trailing byte from `slave`. The slave is
    /// unknown until phase one completes, so the two cannot be merged.
    pub fn poll(&mut self) -> Result<PolledPacket> {
        let mut header = [0u8; POLL_HEADER_LEN];
        self.bus
            .transfer(&mut [I2cMessage::Read {
                addr: POLL_ADDR,
                buf: &mut header,
            }])
            .map_err(|source| BusError::Transaction { addr: None, source })?;

        let [slave, len] = header;
        let len = usize::from(len);
        if len == 0 {
            return Err(BusError::Transaction {
                addr: Some(slave),
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    "slave announced an empty packet",
                ),
            });
        }
        debug!(slave, len, "poll answered");

        let total = len + TRAILER_LEN;
        self.bus
            .transfer(&mut [I2cMessage::Read {
                addr: u16::from(slave),
                buf: &mut self.buf[..total],
            }])
            .map_err(|source| BusError::Transaction {
                addr: Some(slave),
                source,
            })?;

        let packet = Packet::new(Bytes::copy_from_slice(&self.buf[..len]))?;
        Ok(PolledPacket {
            addr: slave,
            packet,
            trailer: self.buf[len],
        })
    }

    /// Borrow the underlying bus.
    pub fn get_ref(&self) -> &B {
        &self.bus
    }

    /// Mutably borrow the underlying bus.
    pub fn get_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Consume the transactor and return the bus.
    pub fn into_inner(self) -> B {
        self.bus
    }
}

impl<B> std::fmt::Debug for BusTransactor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusTransactor").finish_non_exhaustive()
    }
}
