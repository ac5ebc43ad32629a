use std::path::PathBuf;

use clap::Args;
use zbus_bus::{DEFAULT_GPIO_BASE, DEFAULT_I2C_PREFIX, MAX_PIN};
use zbus_gateway::GatewayConfig;

/// Highest accepted I2C adapter number.
pub const MAX_I2C_NUM: u32 = 9;

/// Device selection and the paths it maps onto.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// I2C adapter number.
    #[arg(
        value_name = "I2C_NUM",
        value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_I2C_NUM))
    )]
    pub i2c_num: u32,

    /// GPIO pin wired to the bus alert line.
    #[arg(
        value_name = "GPIO_NUM",
        value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_PIN))
    )]
    pub gpio_num: u32,

    /// Root of the sysfs GPIO tree.
    #[arg(long, value_name = "DIR", env = "ZBUS_GPIO_BASE", default_value = DEFAULT_GPIO_BASE)]
    pub gpio_base: PathBuf,

    /// Adapter device path prefix; the adapter number is appended.
    #[arg(
        long,
        value_name = "PREFIX",
        env = "ZBUS_I2C_PREFIX",
        default_value = DEFAULT_I2C_PREFIX
    )]
    pub i2c_prefix: String,

    /// Poll the bus when the alert line reads 0 instead of 1.
    #[arg(long, env = "ZBUS_ALERT_ACTIVE_LOW")]
    pub alert_active_low: bool,

    /// Announce "ZBUS <version>" on stdout before handling commands.
    #[arg(long, env = "ZBUS_GREETING")]
    pub greeting: bool,
}

impl DeviceArgs {
    /// Adapter device path: the prefix followed by the adapter number.
    pub fn i2c_path(&self) -> PathBuf {
        PathBuf::from(format!("{}{}", self.i2c_prefix, self.i2c_num))
    }

    /// Library configuration for these arguments.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            i2c_path: self.i2c_path(),
            gpio_base: self.gpio_base.clone(),
            gpio_pin: self.gpio_num,
            alert_active_low: self.alert_active_low,
            greeting: self
                .greeting
                .then(|| env!("CARGO_PKG_VERSION").to_string()),
        }
    }
}
