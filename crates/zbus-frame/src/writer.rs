use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::debug;

use crate::codec::{render_command, render_greeting, MAX_LINE_LEN};
use crate::command::Command;
use crate::error::{FrameError, Result};

/// Destination for events produced while handling commands.
pub trait EventSink {
    fn emit(&mut self, command: Command) -> Result<()>;
}

impl EventSink for Vec<Command> {
    fn emit(&mut self, command: Command) -> Result<()> {
        self.push(command);
        Ok(())
    }
}

/// Writes rendered directives to any `Write` stream.
///
/// Each line goes out in a single `write` call. A line the stream only
/// partially accepts fails the whole message; it is never resumed.
pub struct CommandWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> CommandWriter<T> {
    /// Create a writer over `inner`.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_LINE_LEN * 9),
        }
    }

    /// Render and write one directive, then flush.
    pub fn write_command(&mut self, command: &Command) -> Result<()> {
        self.buf.clear();
        render_command(command, &mut self.buf);
        debug!(directive = %command.directive(), addr = ?command.addr(), "writing event");
        self.write_buffered()
    }

    /// Write the `ZBUS <version>` greeting line.
    pub fn write_greeting(&mut self, version: &str) -> Result<()> {
        self.buf.clear();
        render_greeting(version, &mut self.buf);
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<()> {
        for line in self.buf.split_inclusive(|b| *b == b'\n') {
            write_line(&mut self.inner, line)?;
        }
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Write> EventSink for CommandWriter<T> {
    fn emit(&mut self, command: Command) -> Result<()> {
        self.write_command(&command)
    }
}

fn write_line<T: Write>(inner: &mut T, line: &[u8]) -> Result<()> {
    loop {
        match inner.write(line) {
            Ok(n) if n == line.len() => return Ok(()),
            Ok(n) => {
                return Err(FrameError::ShortWrite {
                    written: n,
                    expected: line.len(),
                })
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}

impl<T> std::fmt::Debug for CommandWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandWriter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::codec::{decode_hex_pair, PACKET_LINE_WIDTH};
    use crate::command::{Packet, Udid, MAX_PACKET};
    use crate::reader::{CommandReader, ReadOutcome};

    fn written(command: &Command) -> String {
        let mut writer = CommandWriter::new(Cursor::new(Vec::new()));
        writer.write_command(command).unwrap();
        String::from_utf8(writer.into_inner().into_inner()).unwrap()
    }

    #[test]
    fn writes_ack() {
        assert_eq!(written(&Command::Ack { addr: 0x10 }), "ACK 10\n");
    }

    #[test]
    fn writes_connect_without_udid() {
        let command = Command::Connect {
            addr: 0x30,
            udid: Udid::new(vec![0xde, 0xad]),
        };
        assert_eq!(written(&command), "CONN 30\n");
    }

    #[test]
    fn packet_lines_decode_back_to_payload() {
        for len in 1..=MAX_PACKET {
            let payload: Vec<u8> = (0..len).map(|i| (i * 37 % 256) as u8).collect();
            let command = Command::SendPacket {
                addr: 0x20,
                packet: Packet::new(payload.clone()).unwrap(),
            };
            let text = written(&command);
            let mut lines = text.lines();

            assert_eq!(lines.next(), Some(format!("PKT 20 {:02x}", len).as_str()));

            let data_lines: Vec<&str> = lines.collect();
            assert_eq!(data_lines.len(), len.div_ceil(PACKET_LINE_WIDTH));

            let decoded: Vec<u8> = data_lines
                .iter()
                .flat_map(|line| line.as_bytes().chunks(2))
                .map(|pair| decode_hex_pair([pair[0], pair[1]]).unwrap())
                .collect();
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn every_packet_length_reads_back_through_reader() {
        let mut writer = CommandWriter::new(Cursor::new(Vec::new()));
        let mut sent = Vec::new();
        for len in 1..=MAX_PACKET {
            let payload: Vec<u8> = (0..len).map(|i| (len + i * 13) as u8).collect();
            let command = Command::SendPacket {
                addr: len as u8,
                packet: Packet::new(payload).unwrap(),
            };
            writer.write_command(&command).unwrap();
            sent.push(command);
        }

        let wire = writer.into_inner().into_inner();
        let mut reader = CommandReader::new(Cursor::new(wire));
        for expected in sent {
            assert_eq!(
                reader.read_command().unwrap(),
                ReadOutcome::Command(expected)
            );
        }
        assert_eq!(reader.read_command().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn each_line_is_one_write() {
        #[derive(Default)]
        struct RecordingWriter {
            writes: Vec<Vec<u8>>,
        }
        impl Write for RecordingWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.writes.push(buf.to_vec());
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = CommandWriter::new(RecordingWriter::default());
        let packet = Packet::new(vec![0x55; 40]).unwrap();
        writer
            .write_command(&Command::SendPacket { addr: 1, packet })
            .unwrap();

        let writes = writer.into_inner().writes;
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|w| w.ends_with(b"\n")));
        assert_eq!(writes[1].len(), 65);
        assert_eq!(writes[2].len(), 17);
    }

    #[test]
    fn short_write_fails_without_resuming() {
        struct HalfWriter {
            calls: usize,
        }
        impl Write for HalfWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.calls += 1;
                Ok(buf.len() / 2)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = CommandWriter::new(HalfWriter { calls: 0 });
        let err = writer
            .write_command(&Command::Error { addr: 0x44 })
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::ShortWrite {
                written: 3,
                expected: 7
            }
        ));
        assert_eq!(writer.get_ref().calls, 1);
    }

    #[test]
    fn zero_write_is_short_write() {
        struct ZeroWriter;
        impl Write for ZeroWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = CommandWriter::new(ZeroWriter);
        assert!(matches!(
            writer.write_command(&Command::Reset),
            Err(FrameError::ShortWrite { written: 0, .. })
        ));
    }

    #[test]
    fn write_error_propagates() {
        struct BrokenPipe;
        impl Write for BrokenPipe {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = CommandWriter::new(BrokenPipe);
        assert!(matches!(
            writer.write_command(&Command::Ack { addr: 1 }),
            Err(FrameError::Io(_))
        ));
    }

    #[test]
    fn interrupted_write_retries_line() {
        struct InterruptedOnce {
            interrupted: bool,
            data: Vec<u8>,
        }
        impl Write for InterruptedOnce {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(std::io::Error::from(ErrorKind::Interrupted));
                }
                self.data.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = CommandWriter::new(InterruptedOnce {
            interrupted: false,
            data: Vec::new(),
        });
        writer.write_command(&Command::Disconnect { addr: 9 }).unwrap();
        assert_eq!(writer.into_inner().data, b"DISC 09\n");
    }

    #[test]
    fn flush_follows_every_message() {
        #[derive(Default)]
        struct FlushTracking {
            flushed: Arc<AtomicBool>,
        }
        impl Write for FlushTracking {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                self.flushed.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let sink = FlushTracking::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = CommandWriter::new(sink);
        writer.write_greeting("0.1.0").unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn vec_sink_collects_events() {
        let mut sink: Vec<Command> = Vec::new();
        sink.emit(Command::Ack { addr: 3 }).unwrap();
        assert_eq!(sink, vec![Command::Ack { addr: 3 }]);
    }
}
