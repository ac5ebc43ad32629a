//! The gateway event loop.
//!
//! One thread waits on two descriptors at once: the supervisor's command
//! stream and the alert line. Readable commands are drained and dispatched
//! to the bus; an asserted alert triggers one poll transaction whose result
//! is written back as an event.

pub mod config;
pub mod error;
pub mod gateway;
pub mod shutdown;
pub mod wait;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::{ExitReason, Gateway, LoopState, Step};
pub use shutdown::ShutdownSignal;
pub use wait::{set_nonblocking, wait_ready, Readiness};
