use bytes::{BufMut, BytesMut};

use crate::command::{Command, Directive, Packet};

/// Longest line either side may send, newline included.
pub const MAX_LINE_LEN: usize = 80;

/// Payload bytes rendered per PKT data line (two hex digits each).
pub const PACKET_LINE_WIDTH: usize = 32;

/// Token buffer size; one slot is reserved, so tokens keep at most 15 bytes.
pub const TOKEN_CAPACITY: usize = 16;

const UPPER_HEX: &[u8; 16] = b"0123456789ABCDEF";
const LOWER_HEX: &[u8; 16] = b"0123456789abcdef";

/// Encode one payload byte as a hex pair, low nibble first.
pub fn encode_hex_pair(byte: u8) -> [u8; 2] {
    [
        UPPER_HEX[(byte & 0x0f) as usize],
        UPPER_HEX[(byte >> 4) as usize],
    ]
}

/// Decode a low-nibble-first hex pair. Either digit case is accepted.
pub fn decode_hex_pair(pair: [u8; 2]) -> Option<u8> {
    let low = hex_digit(pair[0])?;
    let high = hex_digit(pair[1])?;
    Some((high << 4) | low)
}

/// Parse a two-digit, most-significant-first header field such as `<addr>`.
pub(crate) fn parse_header_byte(token: &[u8]) -> Option<u8> {
    match token {
        [high, low] => Some((hex_digit(*high)? << 4) | hex_digit(*low)?),
        _ => None,
    }
}

pub(crate) fn hex_digit(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

fn put_header_byte(dst: &mut BytesMut, byte: u8) {
    dst.put_u8(b' ');
    dst.put_u8(LOWER_HEX[(byte >> 4) as usize]);
    dst.put_u8(LOWER_HEX[(byte & 0x0f) as usize]);
}

fn put_addressed(dst: &mut BytesMut, directive: Directive, addr: u8) {
    dst.put_slice(directive.as_str().as_bytes());
    put_header_byte(dst, addr);
    dst.put_u8(b'\n');
}

fn put_packet(dst: &mut BytesMut, addr: u8, packet: &Packet) {
    dst.reserve(8 + packet.data().len() * 2 + packet.data().len() / PACKET_LINE_WIDTH + 1);
    dst.put_slice(Directive::Packet.as_str().as_bytes());
    put_header_byte(dst, addr);
    put_header_byte(dst, packet.len());
    dst.put_u8(b'\n');

    for chunk in packet.data().chunks(PACKET_LINE_WIDTH) {
        for byte in chunk {
            dst.put_slice(&encode_hex_pair(*byte));
        }
        dst.put_u8(b'\n');
    }
}

/// Render a command as one or more newline-terminated lines.
///
/// Wire format:
/// ```text
/// RST\n
/// PKT aa ll\n          header, lowercase hex
/// 0F1E...\n            ceil(ll / 32) data lines, uppercase, low nibble first
/// ACK aa\n | ERR aa\n | CONN aa\n | DISC aa\n
/// ```
pub fn render_command(command: &Command, dst: &mut BytesMut) {
    match command {
        Command::Reset => {
            dst.put_slice(Directive::Reset.as_str().as_bytes());
            dst.put_u8(b'\n');
        }
        Command::SendPacket { addr, packet } => put_packet(dst, *addr, packet),
        Command::Ack { addr } => put_addressed(dst, Directive::Ack, *addr),
        Command::Error { addr } => put_addressed(dst, Directive::Error, *addr),
        // the UDID has no agreed wire form yet
        Command::Connect { addr, .. } => put_addressed(dst, Directive::Connect, *addr),
        Command::Disconnect { addr } => put_addressed(dst, Directive::Disconnect, *addr),
    }
}

/// Render the `ZBUS <version>` greeting line.
pub fn render_greeting(version: &str, dst: &mut BytesMut) {
    dst.put_slice(b"ZBUS ");
    dst.put_slice(version.as_bytes());
    dst.put_u8(b'\n');
}
