//! Combined I2C transactions.
//!
//! [`I2cBus`] is the seam the transactor is written against; [`I2cDevice`]
//! implements it on top of the Linux `i2c-dev` `I2C_RDWR` ioctl.

use std::io;

/// One segment of a combined transaction.
#[derive(Debug)]
pub enum I2cMessage<'a> {
    /// Master writes `data` to the slave at `addr`.
    Write { addr: u16, data: &'a [u8] },
    /// Master reads `buf.len()` bytes from the slave at `addr`.
    Read { addr: u16, buf: &'a mut [u8] },
}

impl I2cMessage<'_> {
    /// Target slave address.
    pub fn addr(&self) -> u16 {
        match self {
            I2cMessage::Write { addr, .. } | I2cMessage::Read { addr, .. } => *addr,
        }
    }

    /// Number of bytes written or read.
    pub fn len(&self) -> usize {
        match self {
            I2cMessage::Write { data, .. } => data.len(),
            I2cMessage::Read { buf, .. } => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A bus able to run an ordered list of messages as one transaction.
pub trait I2cBus {
    /// Execute `messages` in order. Read buffers are filled in place.
    fn transfer(&mut self, messages: &mut [I2cMessage<'_>]) -> io::Result<()>;
}

impl<B: I2cBus + ?Sized> I2cBus for &mut B {
    fn transfer(&mut self, messages: &mut [I2cMessage<'_>]) -> io::Result<()> {
        (**self).transfer(messages)
    }
}

impl<B: I2cBus + ?Sized> I2cBus for Box<B> {
    fn transfer(&mut self, messages: &mut [I2cMessage<'_>]) -> io::Result<()> {
        (**self).transfer(messages)
    }
}

/// Adapter device path prefix; the bus number is appended.
pub const DEFAULT_I2C_PREFIX: &str = "/dev/i2c-";

#[cfg(target_os = "linux")]
pub use device::I2cDevice;

#[cfg(target_os = "linux")]
mod device {
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::fd::AsRawFd;
    use std::path::{Path, PathBuf};

    use tracing::{debug, info};

    use super::{I2cBus, I2cMessage, DEFAULT_I2C_PREFIX};
    use crate::error::{BusError, Result};

    // <linux/i2c-dev.h>, <linux/i2c.h>
    const I2C_FUNCS: u32 = 0x0705;
    const I2C_RDWR: u32 = 0x0707;
    const I2C_FUNC_I2C: libc::c_ulong = 0x0000_0001;
    const I2C_M_RD: u16 = 0x0001;

    /// `struct i2c_msg`
    #[repr(C)]
    struct RawMessage {
        addr: u16,
        flags: u16,
        len: u16,
        buf: *mut u8,
    }

    /// `struct i2c_rdwr_ioctl_data`
    #[repr(C)]
    struct RdwrIoctlData {
        msgs: *mut RawMessage,
        nmsgs: u32,
    }

    /// An open `/dev/i2c-N` adapter.
    #[derive(Debug)]
    pub struct I2cDevice {
        file: File,
        path: PathBuf,
    }

    impl I2cDevice {
        /// Open adapter `bus_num` under [`DEFAULT_I2C_PREFIX`].
        pub fn open_bus(bus_num: u32) -> Result<Self> {
            Self::open(format!("{DEFAULT_I2C_PREFIX}{bus_num}"))
        }

        /// Open an adapter device and confirm it supports plain I2C transfers.
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref().to_path_buf();
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| BusError::Device {
                    path: path.clone(),
                    source: e,
                })?;

            let mut funcs: libc::c_ulong = 0;
            // SAFETY: `funcs` is a valid writable `unsigned long`, which is what
            // I2C_FUNCS stores into, and the descriptor is owned by `file`.
            let rc = unsafe { libc::ioctl(file.as_raw_fd(), I2C_FUNCS as _, &mut funcs) };
            if rc < 0 {
                return Err(BusError::Device {
                    path,
                    source: io::Error::last_os_error(),
                });
            }

            if funcs & I2C_FUNC_I2C == 0 {
                return Err(BusError::Unsupported { path });
            }

            info!(?path, funcs = format_args!("{funcs:#x}"), "opened i2c adapter");
            Ok(Self { file, path })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl I2cBus for I2cDevice {
        fn transfer(&mut self, messages: &mut [I2cMessage<'_>]) -> io::Result<()> {
            let mut raw = Vec::with_capacity(messages.len());
            for message in messages.iter_mut() {
                let len = u16::try_from(message.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "i2c message too long")
                })?;
                raw.push(match message {
                    I2cMessage::Write { addr, data } => RawMessage {
                        addr: *addr,
                        flags: 0,
                        len,
                        // the kernel only reads from write buffers
                        buf: data.as_ptr().cast_mut(),
                    },
                    I2cMessage::Read { addr, buf } => RawMessage {
                        addr: *addr,
                        flags: I2C_M_RD,
                        len,
                        buf: buf.as_mut_ptr(),
                    },
                });
            }

            let mut data = RdwrIoctlData {
                msgs: raw.as_mut_ptr(),
                nmsgs: raw.len() as u32,
            };

            // SAFETY: every RawMessage points into a buffer borrowed from
            // `messages` for the duration of this call, with `len` matching the
            // buffer size; read buffers are uniquely borrowed.
            let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), I2C_RDWR as _, &mut data) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                debug!(error = %err, count = messages.len(), "i2c transfer failed");
                return Err(err);
            }

            Ok(())
        }
    }

}
