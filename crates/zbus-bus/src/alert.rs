//! The alert line: a sysfs GPIO input with edge interrupts.
//!
//! Layout used, relative to the sysfs GPIO root:
//!
//! ```text
//! export             write "<N>" to create gpio<N>/
//! gpio<N>/direction  write "in"
//! gpio<N>/edge       write "both"
//! gpio<N>/value      read "0" / "1"; raises POLLPRI on every edge
//! ```

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::{BusError, Result};

/// Default sysfs GPIO root.
pub const DEFAULT_GPIO_BASE: &str = "/sys/class/gpio";

/// Highest accepted GPIO pin number.
pub const MAX_PIN: u32 = 9999;

/// Pin directories currently held by an [`AlertMonitor`] in this process.
static OPEN_PINS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

/// Level of the alert line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Asserted,
    Deasserted,
}

impl AlertLevel {
    /// Interpret a sysfs `value` read. Only `0` (ignoring trailing
    /// whitespace) is deasserted.
    pub fn from_sysfs(raw: &[u8]) -> Self {
        if raw.trim_ascii_end() == b"0" {
            AlertLevel::Deasserted
        } else {
            AlertLevel::Asserted
        }
    }

    /// The opposite level.
    pub fn inverted(self) -> Self {
        match self {
            AlertLevel::Asserted => AlertLevel::Deasserted,
            AlertLevel::Deasserted => AlertLevel::Asserted,
        }
    }

    /// True when a slave is requesting a poll.
    pub fn is_asserted(self) -> bool {
        self == AlertLevel::Asserted
    }
}

/// Readiness condition the event loop must wait for on an alert descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitInterest {
    /// Exceptional condition (`POLLPRI`), as raised by sysfs edge files.
    Priority,
    /// Ordinary readability (`POLLIN`).
    Readable,
}

/// Something the event loop can watch for alerts.
pub trait AlertSource: AsFd {
    fn interest(&self) -> WaitInterest;

    /// Current level, with any configured polarity applied.
    fn level(&mut self) -> Result<AlertLevel>;
}

struct PinClaim(PathBuf);

impl PinClaim {
    fn acquire(dir: &Path) -> Result<Self> {
        let mut open = OPEN_PINS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if open.iter().any(|held| held == dir) {
            return Err(BusError::AlreadyOpen(dir.to_path_buf()));
        }
        open.push(dir.to_path_buf());
        Ok(Self(dir.to_path_buf()))
    }
}

impl Drop for PinClaim {
    fn drop(&mut self) {
        let mut open = OPEN_PINS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        open.retain(|held| held != &self.0);
    }
}

/// An alert GPIO configured for both-edge interrupts.
///
/// The pin stays claimed until the monitor is dropped or closed; a second
/// `open` of the same pin in this process fails with
/// [`BusError::AlreadyOpen`].
pub struct AlertMonitor {
    value: File,
    pin: u32,
    active_low: bool,
    _claim: PinClaim,
}

impl AlertMonitor {
    /// Open `pin` under [`DEFAULT_GPIO_BASE`].
    pub fn open(pin: u32) -> Result<Self> {
        Self::open_in(DEFAULT_GPIO_BASE, pin)
    }

    /// Export (if needed) and configure `pin` under the sysfs root `base`.
    pub fn open_in(base: impl AsRef<Path>, pin: u32) -> Result<Self> {
        let base = base.as_ref();
        let dir = base.join(format!("gpio{pin}"));
        if pin > MAX_PIN {
            return Err(BusError::Device {
                path: dir,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("gpio pin {pin} out of range (0..={MAX_PIN})"),
                ),
            });
        }

        let claim = PinClaim::acquire(&dir)?;

        if !dir.exists() {
            debug!(pin, "exporting gpio");
            sysfs_write(&base.join("export"), &pin.to_string())?;
        }

        sysfs_write(&dir.join("direction"), "in")?;
        sysfs_write(&dir.join("edge"), "both")?;

        let value_path = dir.join("value");
        let value = File::open(&value_path).map_err(|e| BusError::Device {
            path: value_path.clone(),
            source: e,
        })?;

        let mut monitor = Self {
            value,
            pin,
            active_low: false,
            _claim: claim,
        };

        // the first read also clears the pending edge notification
        let initial = monitor.read_raw().map_err(|e| BusError::Device {
            path: value_path,
            source: e,
        })?;
        info!(pin, level = ?initial, "alert line configured");

        Ok(monitor)
    }

    /// Treat a `0` reading as asserted instead.
    pub fn with_active_low(mut self, active_low: bool) -> Self {
        self.active_low = active_low;
        self
    }

    /// Re-read the raw level from the start of the `value` attribute.
    pub fn value(&mut self) -> Result<AlertLevel> {
        Ok(self.read_raw()?)
    }

    fn read_raw(&mut self) -> std::io::Result<AlertLevel> {
        self.value.seek(SeekFrom::Start(0))?;
        let mut raw = [0u8; 8];
        let n = self.value.read(&mut raw)?;
        Ok(AlertLevel::from_sysfs(&raw[..n]))
    }

    /// GPIO pin number this monitor was opened on.
    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Release the descriptor and the pin claim.
    pub fn close(self) {
        debug!(pin = self.pin, "closing alert line");
    }
}

impl AsFd for AlertMonitor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.value.as_fd()
    }
}

impl AlertSource for AlertMonitor {
    fn interest(&self) -> WaitInterest {
        WaitInterest::Priority
    }

    fn level(&mut self) -> Result<AlertLevel> {
        let raw = self.value()?;
        Ok(if self.active_low { raw.inverted() } else { raw })
    }
}

impl std::fmt::Debug for AlertMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertMonitor")
            .field("pin", &self.pin)
            .field("active_low", &self.active_low)
            .finish()
    }
}

fn sysfs_write(path: &Path, value: &str) -> Result<()> {
    let device_error = |source| BusError::Device {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(device_error)?;
    file.write_all(value.as_bytes()).map_err(device_error)
}
