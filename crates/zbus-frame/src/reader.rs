use std::io::{ErrorKind, Read};
use std::mem;

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::codec::{decode_hex_pair, hex_digit, parse_header_byte, MAX_LINE_LEN, TOKEN_CAPACITY};
use crate::command::{Command, Directive, Packet, Udid};
use crate::error::{FrameError, Result};

/// Result of one [`CommandReader::read_command`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete directive was parsed.
    Command(Command),
    /// The stream is non-blocking and has nothing more right now.
    WouldBlock,
    /// The stream is closed. Returned again on every later call.
    EndOfStream,
}

enum TokenOutcome {
    Token,
    WouldBlock,
    EndOfStream,
}

enum Fill {
    Data,
    WouldBlock,
    EndOfStream,
}

#[derive(Debug)]
struct PacketAssembly {
    addr: u8,
    expected: usize,
    data: BytesMut,
    /// First digit of a hex pair whose second digit has not arrived yet.
    pending: Option<u8>,
}

#[derive(Debug)]
enum ParseState {
    Directive,
    Address(Directive),
    PacketLength { addr: u8 },
    PacketData(PacketAssembly),
}

impl ParseState {
    fn describe(&self) -> &'static str {
        match self {
            ParseState::Directive => "directive",
            ParseState::Address(_) => "address",
            ParseState::PacketLength { .. } => "packet length",
            ParseState::PacketData(_) => "packet data",
        }
    }
}

/// Reads directives from any `Read` stream.
///
/// Bytes are pulled into a line-sized buffer and split on ASCII whitespace.
/// Parsing is resumable: when a non-blocking stream runs dry in the middle of
/// a directive, the partial state is kept and the next call continues it.
pub struct CommandReader<T> {
    inner: T,
    buf: [u8; MAX_LINE_LEN],
    pos: usize,
    len: usize,
    token: [u8; TOKEN_CAPACITY],
    token_len: usize,
    truncating: bool,
    state: ParseState,
    eof: bool,
}

impl<T: Read> CommandReader<T> {
    /// Create a reader over `inner` with an empty line buffer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: [0; MAX_LINE_LEN],
            pos: 0,
            len: 0,
            token: [0; TOKEN_CAPACITY],
            token_len: 0,
            truncating: false,
            state: ParseState::Directive,
            eof: false,
        }
    }

    /// Read the next directive.
    ///
    /// Blocks only as long as the underlying `read` blocks. A would-block
    /// read yields [`ReadOutcome::WouldBlock`] and a zero-length read yields
    /// [`ReadOutcome::EndOfStream`]. Input outside the grammar, including a
    /// stream that closes mid-directive, is [`FrameError::Protocol`].
    pub fn read_command(&mut self) -> Result<ReadOutcome> {
        loop {
            if let ParseState::PacketData(_) = self.state {
                let ParseState::PacketData(mut assembly) =
                    mem::replace(&mut self.state, ParseState::Directive)
                else {
                    continue;
                };

                match self.scan_packet_data(&mut assembly)? {
                    TokenOutcome::Token => {
                        let packet = Packet::new(assembly.data.freeze())?;
                        debug!(addr = assembly.addr, len = packet.len(), "parsed packet");
                        return Ok(ReadOutcome::Command(Command::SendPacket {
                            addr: assembly.addr,
                            packet,
                        }));
                    }
                    TokenOutcome::WouldBlock => {
                        self.state = ParseState::PacketData(assembly);
                        return Ok(ReadOutcome::WouldBlock);
                    }
                    TokenOutcome::EndOfStream => {
                        return Err(FrameError::protocol(format!(
                            "stream closed after {} of {} packet bytes",
                            assembly.data.len(),
                            assembly.expected
                        )));
                    }
                }
            }

            match self.next_token()? {
                TokenOutcome::Token => {
                    let (token, len) = self.take_token();
                    if let Some(command) = self.advance(&token[..len])? {
                        return Ok(ReadOutcome::Command(command));
                    }
                }
                TokenOutcome::WouldBlock => return Ok(ReadOutcome::WouldBlock),
                TokenOutcome::EndOfStream => {
                    let state = mem::replace(&mut self.state, ParseState::Directive);
                    if let ParseState::Directive = state {
                        return Ok(ReadOutcome::EndOfStream);
                    }
                    return Err(FrameError::protocol(format!(
                        "stream closed while expecting {}",
                        state.describe()
                    )));
                }
            }
        }
    }

    /// True while a directive has been started but not completed.
    pub fn is_mid_command(&self) -> bool {
        !matches!(self.state, ParseState::Directive) || self.token_len > 0
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream. Reading from it directly desynchronizes the parser.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream, dropping any buffered input.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn advance(&mut self, token: &[u8]) -> Result<Option<Command>> {
        match mem::replace(&mut self.state, ParseState::Directive) {
            ParseState::Directive => match Directive::from_token(token) {
                Some(Directive::Reset) => Ok(Some(Command::Reset)),
                Some(directive) => {
                    self.state = ParseState::Address(directive);
                    Ok(None)
                }
                None => Err(FrameError::protocol(format!(
                    "unknown directive {:?}",
                    String::from_utf8_lossy(token)
                ))),
            },
            ParseState::Address(directive) => {
                let addr = header_field(token, "address")?;
                let command = match directive {
                    Directive::Packet => {
                        self.state = ParseState::PacketLength { addr };
                        return Ok(None);
                    }
                    Directive::Ack => Command::Ack { addr },
                    Directive::Error => Command::Error { addr },
                    Directive::Connect => Command::Connect {
                        addr,
                        udid: Udid::default(),
                    },
                    Directive::Disconnect => Command::Disconnect { addr },
                    Directive::Reset => Command::Reset,
                };
                Ok(Some(command))
            }
            ParseState::PacketLength { addr } => {
                let expected = header_field(token, "packet length")? as usize;
                if expected == 0 {
                    return Err(FrameError::protocol("packet length must be at least 1"));
                }
                self.state = ParseState::PacketData(PacketAssembly {
                    addr,
                    expected,
                    data: BytesMut::with_capacity(expected),
                    pending: None,
                });
                Ok(None)
            }
            ParseState::PacketData(assembly) => {
                // packet data is consumed by scan_packet_data, never as a token
                self.state = ParseState::PacketData(assembly);
                Ok(None)
            }
        }
    }

    /// Consume hex pairs straight from the line buffer until the packet is
    /// complete. `Token` signals completion.
    fn scan_packet_data(&mut self, assembly: &mut PacketAssembly) -> Result<TokenOutcome> {
        loop {
            while self.pos < self.len {
                let ch = self.buf[self.pos];
                self.pos += 1;

                if is_space(ch) {
                    if assembly.pending.is_some() {
                        return Err(FrameError::protocol("odd number of hex digits in packet data"));
                    }
                    continue;
                }

                match assembly.pending.take() {
                    None => {
                        if hex_digit(ch).is_none() {
                            return Err(invalid_hex(ch));
                        }
                        assembly.pending = Some(ch);
                    }
                    Some(low) => {
                        let byte = decode_hex_pair([low, ch]).ok_or_else(|| invalid_hex(ch))?;
                        assembly.data.put_u8(byte);
                        if assembly.data.len() == assembly.expected {
                            return Ok(TokenOutcome::Token);
                        }
                    }
                }
            }

            match self.fill()? {
                Fill::Data => continue,
                Fill::WouldBlock => return Ok(TokenOutcome::WouldBlock),
                Fill::EndOfStream => return Ok(TokenOutcome::EndOfStream),
            }
        }
    }

    fn next_token(&mut self) -> Result<TokenOutcome> {
        loop {
            while self.pos < self.len {
                let ch = self.buf[self.pos];
                self.pos += 1;

                if is_space(ch) {
                    if self.token_len > 0 {
                        return Ok(TokenOutcome::Token);
                    }
                    continue;
                }

                if self.token_len < TOKEN_CAPACITY - 1 {
                    self.token[self.token_len] = ch;
                    self.token_len += 1;
                } else if !self.truncating {
                    self.truncating = true;
                    debug!(kept = self.token_len, "truncating over-long token");
                }
            }

            match self.fill()? {
                Fill::Data => continue,
                Fill::WouldBlock => return Ok(TokenOutcome::WouldBlock),
                Fill::EndOfStream if self.token_len > 0 => return Ok(TokenOutcome::Token),
                Fill::EndOfStream => return Ok(TokenOutcome::EndOfStream),
            }
        }
    }

    fn take_token(&mut self) -> ([u8; TOKEN_CAPACITY], usize) {
        let taken = (self.token, self.token_len);
        self.token_len = 0;
        self.truncating = false;
        taken
    }

    /// Refill the line buffer. Only called once the buffer is fully consumed.
    fn fill(&mut self) -> Result<Fill> {
        if self.eof {
            return Ok(Fill::EndOfStream);
        }

        loop {
            match self.inner.read(&mut self.buf) {
                Ok(0) => {
                    debug!("command stream closed");
                    self.eof = true;
                    self.pos = 0;
                    self.len = 0;
                    return Ok(Fill::EndOfStream);
                }
                Ok(n) => {
                    self.pos = 0;
                    self.len = n;
                    return Ok(Fill::Data);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(Fill::WouldBlock),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

fn header_field(token: &[u8], what: &str) -> Result<u8> {
    parse_header_byte(token).ok_or_else(|| {
        FrameError::protocol(format!(
            "invalid {what} {:?} (expected two hex digits)",
            String::from_utf8_lossy(token)
        ))
    })
}

fn invalid_hex(ch: u8) -> FrameError {
    FrameError::protocol(format!(
        "invalid hex digit {:?} in packet data",
        char::from(ch)
    ))
}

fn is_space(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

impl<T> std::fmt::Debug for CommandReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandReader")
            .field("pos", &self.pos)
            .field("len", &self.len)
            .field("state", &self.state)
            .field("eof", &self.eof)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::render_command;

    fn reader(input: &str) -> CommandReader<Cursor<Vec<u8>>> {
        CommandReader::new(Cursor::new(input.as_bytes().to_vec()))
    }

    fn expect_command<T: Read>(reader: &mut CommandReader<T>) -> Command {
        match reader.read_command().unwrap() {
            ReadOutcome::Command(command) => command,
            other => panic!("expected command, got {other:?}"),
        }
    }

    /// Replays a script of reads; `None` entries report `WouldBlock`.
    struct ScriptedReader {
        steps: VecDeque<Option<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(steps: Vec<Option<&str>>) -> Self {
            Self {
                steps: steps
                    .into_iter()
                    .map(|step| step.map(|s| s.as_bytes().to_vec()))
                    .collect(),
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(None) => Err(std::io::Error::from(ErrorKind::WouldBlock)),
                Some(Some(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.steps.push_front(Some(bytes.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    #[test]
    fn reads_reset() {
        let mut reader = reader("RST\n");
        let command = expect_command(&mut reader);
        assert_eq!(command, Command::Reset);
        assert_eq!(command.addr(), None);
        assert!(command.packet().is_none());
        assert!(command.udid().is_none());
    }

    #[test]
    fn end_of_stream_is_sticky() {
        let mut reader = reader("");
        assert_eq!(reader.read_command().unwrap(), ReadOutcome::EndOfStream);
        assert_eq!(reader.read_command().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn end_of_stream_after_last_command() {
        let mut reader = reader("RST");
        assert_eq!(expect_command(&mut reader), Command::Reset);
        assert_eq!(reader.read_command().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn would_block_is_not_end_of_stream() {
        let mut reader = CommandReader::new(ScriptedReader::new(vec![None]));
        assert_eq!(reader.read_command().unwrap(), ReadOutcome::WouldBlock);
        assert_eq!(reader.read_command().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn unknown_directive_is_protocol_error() {
        let mut reader = reader("HELLO\n");
        let err = reader.read_command().unwrap_err();
        assert!(matches!(err, FrameError::Protocol(_)));
    }

    #[test]
    fn directives_are_case_sensitive() {
        let mut reader = reader("rst\n");
        assert!(matches!(
            reader.read_command(),
            Err(FrameError::Protocol(_))
        ));
    }

    #[test]
    fn long_token_is_truncated_to_fifteen_bytes() {
        let mut reader = reader("ABCDEFGHIJKLMNOPQRST\nRST\n");
        let err = reader.read_command().unwrap_err();
        match err {
            FrameError::Protocol(message) => {
                assert!(message.contains("\"ABCDEFGHIJKLMNO\""), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }

        // the rest of the long token is discarded, not read as a new token
        assert_eq!(expect_command(&mut reader), Command::Reset);
    }

    #[test]
    fn reads_packet() {
        let mut reader = reader("PKT 20 03\nBADCFE\n");
        let command = expect_command(&mut reader);
        let Command::SendPacket { addr, packet } = command else {
            panic!("expected packet");
        };
        assert_eq!(addr, 0x20);
        assert_eq!(packet.len(), 3);
        assert_eq!(packet.data(), &[0xAB, 0xCD, 0xEF]);
    }

    #[test]
    fn reads_packet_split_across_tokens_and_lines() {
        let mut reader = reader("PKT 0a 04 10\n  32 54\n76\nRST\n");
        let command = expect_command(&mut reader);
        assert_eq!(command.packet().unwrap().data(), &[0x01, 0x23, 0x45, 0x67]);
        assert_eq!(expect_command(&mut reader), Command::Reset);
    }

    #[test]
    fn reads_rendered_full_size_packet() {
        let payload: Vec<u8> = (0..=254u8).rev().collect();
        let sent = Command::SendPacket {
            addr: 0x42,
            packet: Packet::new(payload).unwrap(),
        };
        let mut wire = BytesMut::new();
        render_command(&sent, &mut wire);

        let mut reader = CommandReader::new(Cursor::new(wire.to_vec()));
        assert_eq!(expect_command(&mut reader), sent);
    }

    #[test]
    fn packet_survives_would_block_midway() {
        let mut reader = CommandReader::new(ScriptedReader::new(vec![
            Some("PK"),
            None,
            Some("T 11 02\nB"),
            None,
            Some("A"),
            None,
            Some("DC\n"),
        ]));

        assert_eq!(reader.read_command().unwrap(), ReadOutcome::WouldBlock);
        assert!(reader.is_mid_command());
        assert_eq!(reader.read_command().unwrap(), ReadOutcome::WouldBlock);
        assert_eq!(reader.read_command().unwrap(), ReadOutcome::WouldBlock);
        let command = expect_command(&mut reader);
        assert_eq!(command.addr(), Some(0x11));
        assert_eq!(command.packet().unwrap().data(), &[0xAB, 0xCD]);
        assert!(!reader.is_mid_command());
    }

    #[test]
    fn byte_at_a_time_stream() {
        let steps = "PKT 01 01\nF0\n"
            .chars()
            .map(|c| Some(c.to_string()))
            .collect::<Vec<_>>();
        let steps = steps.iter().map(|s| s.as_deref()).collect();
        let mut reader = CommandReader::new(ScriptedReader::new(steps));

        let command = expect_command(&mut reader);
        assert_eq!(command.packet().unwrap().data(), &[0x0F]);
    }

    #[test]
    fn zero_length_packet_rejected() {
        let mut reader = reader("PKT 20 00\n");
        assert!(matches!(
            reader.read_command(),
            Err(FrameError::Protocol(_))
        ));
    }

    #[test]
    fn odd_hex_token_rejected() {
        let mut reader = reader("PKT 20 02\nABC D\n");
        assert!(matches!(
            reader.read_command(),
            Err(FrameError::Protocol(_))
        ));
    }

    #[test]
    fn non_hex_digit_rejected() {
        let mut reader = reader("PKT 20 01\nZZ\n");
        assert!(matches!(
            reader.read_command(),
            Err(FrameError::Protocol(_))
        ));
    }

    #[test]
    fn overrun_surfaces_as_protocol_error() {
        let mut reader = reader("PKT 20 01\nAABB\n");
        assert!(expect_command(&mut reader).packet().is_some());
        assert!(matches!(
            reader.read_command(),
            Err(FrameError::Protocol(_))
        ));
    }

    #[test]
    fn stream_closed_mid_packet_is_protocol_error() {
        let mut reader = reader("PKT 20 04\nAABB\n");
        assert!(matches!(
            reader.read_command(),
            Err(FrameError::Protocol(_))
        ));
        assert_eq!(reader.read_command().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn malformed_address_rejected() {
        let mut reader = reader("ACK 1\n");
        assert!(matches!(
            reader.read_command(),
            Err(FrameError::Protocol(_))
        ));
    }

    #[test]
    fn reads_event_directives() {
        let mut reader = reader("ACK 10\nERR 7F\nCONN 21\nDISC 03\n");
        assert_eq!(expect_command(&mut reader), Command::Ack { addr: 0x10 });
        assert_eq!(expect_command(&mut reader), Command::Error { addr: 0x7f });
        assert_eq!(
            expect_command(&mut reader),
            Command::Connect {
                addr: 0x21,
                udid: Udid::default()
            }
        );
        assert_eq!(
            expect_command(&mut reader),
            Command::Disconnect { addr: 0x03 }
        );
    }

    #[test]
    fn io_error_propagates() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::BrokenPipe))
            }
        }

        let mut reader = CommandReader::new(Broken);
        assert!(matches!(reader.read_command(), Err(FrameError::Io(_))));
    }

    #[test]
    fn interrupted_read_retries() {
        struct InterruptedOnce {
            interrupted: bool,
            inner: Cursor<Vec<u8>>,
        }
        impl Read for InterruptedOnce {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(std::io::Error::from(ErrorKind::Interrupted));
                }
                self.inner.read(buf)
            }
        }

        let mut reader = CommandReader::new(InterruptedOnce {
            interrupted: false,
            inner: Cursor::new(b"RST\n".to_vec()),
        });
        assert_eq!(expect_command(&mut reader), Command::Reset);
    }
}
