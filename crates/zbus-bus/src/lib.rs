//! Hardware side of the ZEN-bus gateway.
//!
//! - [`alert`]: the sysfs GPIO line a slave pulls to signal pending data
//! - [`i2c`]: the kernel `i2c-dev` combined-transaction primitive
//! - [`transactor`]: the addressed send, reset and two-phase poll exchanges
//!
//! Linux only: both devices are reached through kernel pseudo-files.

pub mod alert;
pub mod error;
pub mod i2c;
pub mod transactor;

pub use alert::{AlertLevel, AlertMonitor, AlertSource, WaitInterest, DEFAULT_GPIO_BASE, MAX_PIN};
pub use error::{BusError, Result};
#[cfg(target_os = "linux")]
pub use i2c::I2cDevice;
pub use i2c::{I2cBus, I2cMessage, DEFAULT_I2C_PREFIX};
pub use transactor::{BusTransactor, PolledPacket, CONF_ADDR, POLL_ADDR, RESET_COMMAND};
