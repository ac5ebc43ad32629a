/// Errors that end the event loop.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Command stream, event stream or protocol failure.
    #[error(transparent)]
    Frame(#[from] zbus_frame::FrameError),

    /// Device setup or a bus failure with no slave to report it against.
    #[error(transparent)]
    Bus(#[from] zbus_bus::BusError),

    /// The multiplexing wait itself failed.
    #[error("wait failed: {0}")]
    Wait(std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
