use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Inner {
    triggered: AtomicBool,
    wake_rx: UnixStream,
    wake_tx: UnixStream,
}

/// A stop request that can be raised from any thread.
///
/// Triggering sets a flag and makes a wake descriptor readable, so a loop
/// blocked in [`wait_ready`](crate::wait_ready) returns without relying on
/// which thread a signal was delivered to.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    /// Create an untriggered signal with its wake socket.
    pub fn new() -> io::Result<Self> {
        let (wake_rx, wake_tx) = UnixStream::pair()?;
        wake_rx.set_nonblocking(true)?;
        wake_tx.set_nonblocking(true)?;
        Ok(Self {
            inner: Arc::new(Inner {
                triggered: AtomicBool::new(false),
                wake_rx,
                wake_tx,
            }),
        })
    }

    /// Request shutdown and wake any blocked wait. Safe to call repeatedly.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        // a full socket already wakes the waiter
        let _ = (&self.inner.wake_tx).write(&[1]);
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Discard pending wake bytes.
    pub fn drain(&self) {
        let mut buf = [0u8; 16];
        while matches!((&self.inner.wake_rx).read(&mut buf), Ok(n) if n > 0) {}
    }
}

impl AsFd for ShutdownSignal {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.wake_rx.as_fd()
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
