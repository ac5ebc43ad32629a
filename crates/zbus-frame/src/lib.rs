//! Line-oriented text framing between the gateway and its supervisor.
//!
//! Every directive occupies one ASCII line of at most [`MAX_LINE_LEN`] bytes:
//!
//! ```text
//! RST
//! PKT <addr> <len>
//! <hex pairs, at most 32 per line>...
//! ACK <addr>
//! ERR <addr>
//! CONN <addr>
//! DISC <addr>
//! ```
//!
//! [`CommandReader`] turns an inbound byte stream into [`Command`] values and
//! [`CommandWriter`] renders events onto the outbound stream.

pub mod codec;
pub mod command;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_hex_pair, encode_hex_pair, render_command, render_greeting, MAX_LINE_LEN,
    PACKET_LINE_WIDTH, TOKEN_CAPACITY,
};
pub use command::{Command, Directive, Packet, Udid, MAX_PACKET};
pub use error::{FrameError, Result};
pub use reader::{CommandReader, ReadOutcome};
pub use writer::{CommandWriter, EventSink};
