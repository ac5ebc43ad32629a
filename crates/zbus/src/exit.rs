use std::fmt;
use std::io;

use zbus_bus::BusError;
use zbus_frame::FrameError;
use zbus_gateway::GatewayError;

// sysexits.h
pub const SUCCESS: i32 = 0;
pub const USAGE: i32 = 64;
pub const NO_INPUT: i32 = 66;
pub const IO_ERROR: i32 = 74;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(IO_ERROR, format!("{context}: {err}"))
}

pub fn bus_error(context: &str, err: BusError) -> CliError {
    let code = match err {
        BusError::InvalidArgument(_) => USAGE,
        BusError::Device { .. } | BusError::AlreadyOpen(_) | BusError::Unsupported { .. } => {
            NO_INPUT
        }
        BusError::Transaction { .. } | BusError::Frame(_) | BusError::Io(_) => IO_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(IO_ERROR, format!("{context}: {err}"))
}

pub fn gateway_error(context: &str, err: GatewayError) -> CliError {
    match err {
        GatewayError::Bus(err) => bus_error(context, err),
        GatewayError::Frame(err) => frame_error(context, err),
        GatewayError::Wait(err) => io_error(context, err),
    }
}
