use std::path::PathBuf;

use zbus_bus::{DEFAULT_GPIO_BASE, DEFAULT_I2C_PREFIX};

/// Everything needed to bring up a gateway on real devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Path of the I2C adapter device, e.g. `/dev/i2c-1`.
    pub i2c_path: PathBuf,
    /// Root of the sysfs GPIO tree.
    pub gpio_base: PathBuf,
    pub gpio_pin: u32,
    /// Poll the bus when the alert line reads `0` rather than non-`0`.
    pub alert_active_low: bool,
    /// Version announced in a `ZBUS <version>` line before the loop starts.
    pub greeting: Option<String>,
}

impl GatewayConfig {
    /// Configuration for adapter `i2c_num` and alert pin `gpio_pin` at the
    /// default device locations.
    pub fn new(i2c_num: u32, gpio_pin: u32) -> Self {
        Self {
            i2c_path: PathBuf::from(format!("{DEFAULT_I2C_PREFIX}{i2c_num}")),
            gpio_base: PathBuf::from(DEFAULT_GPIO_BASE),
            gpio_pin,
            alert_active_low: false,
            greeting: None,
        }
    }
}
