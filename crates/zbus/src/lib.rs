//! ZEN-bus gateway.
//!
//! Bridges an I2C bus of ZEN-bus slaves to a supervisor that speaks a small
//! line-oriented text protocol on stdin/stdout.
//!
//! # Crate Structure
//!
//! - [`frame`]: command model and the text codec (`RST`, `PKT`, `ACK`, ...)
//! - [`bus`]: the alert GPIO line and the I2C transactions
//! - [`gateway`]: the event loop tying both together

/// Re-export framing types.
pub mod frame {
    pub use zbus_frame::*;
}

/// Re-export alert line and bus types.
pub mod bus {
    pub use zbus_bus::*;
}

/// Re-export event loop types.
pub mod gateway {
    pub use zbus_gateway::*;
}
