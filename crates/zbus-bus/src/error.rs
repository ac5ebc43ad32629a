use std::path::PathBuf;

/// Errors raised by the alert line and the bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// An out-of-range payload length.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A device file could not be opened or configured.
    #[error("device {path}: {source}")]
    Device {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The GPIO pin is already held by this process.
    #[error("device {0} is already open")]
    AlreadyOpen(PathBuf),

    /// The I2C adapter lacks plain addressed read/write transfers.
    #[error("device {path} does not support I2C transfers")]
    Unsupported { path: PathBuf },

    /// A bus transaction failed. `addr` is the slave involved, when known.
    #[error("bus transaction failed{}: {source}", fmt_addr(.addr))]
    Transaction {
        addr: Option<u8>,
        source: std::io::Error,
    },

    /// Emitting an event for a completed transaction failed.
    #[error("event emission failed: {0}")]
    Frame(#[from] zbus_frame::FrameError),

    /// An I/O error on an already-open device.
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_addr(addr: &Option<u8>) -> String {
    match addr {
        Some(addr) => format!(" (slave {addr:#04x})"),
        None => String::new(),
    }
}

impl BusError {
    /// Slave address a failed transaction can be reported against.
    pub fn slave_addr(&self) -> Option<u8> {
        match self {
            BusError::Transaction { addr, .. } => *addr,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
