/// Errors that can occur while reading or writing protocol lines.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The supervisor sent input outside the recognized grammar.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A packet payload is empty or longer than the protocol allows.
    #[error("invalid packet length {len} (expected 1..=255)")]
    InvalidPacket { len: usize },

    /// The stream accepted only part of a rendered line.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// An I/O error occurred on the command or event stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        FrameError::Protocol(message.into())
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
