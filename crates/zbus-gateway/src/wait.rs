use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

use zbus_bus::WaitInterest;

/// Which of the watched descriptors became ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub commands: bool,
    pub alert: bool,
    pub wake: bool,
}

/// Block until the command stream is readable, the alert descriptor
/// reports `alert_interest`, or the optional `wake` descriptor is readable.
/// There is no timeout.
///
/// An interrupted wait is returned as `ErrorKind::Interrupted` so the caller
/// can check for a shutdown request before waiting again.
pub fn wait_ready(
    commands: BorrowedFd<'_>,
    alert: BorrowedFd<'_>,
    alert_interest: WaitInterest,
    wake: Option<BorrowedFd<'_>>,
) -> io::Result<Readiness> {
    let alert_events = match alert_interest {
        WaitInterest::Priority => libc::POLLPRI,
        WaitInterest::Readable => libc::POLLIN,
    };

    let mut fds = [
        libc::pollfd {
            fd: commands.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: alert.as_raw_fd(),
            events: alert_events,
            revents: 0,
        },
        // negative descriptors are skipped by poll
        libc::pollfd {
            fd: wake.map_or(-1, |fd| fd.as_raw_fd()),
            events: libc::POLLIN,
            revents: 0,
        },
    ];

    // SAFETY: `fds` is a valid array of initialized pollfd structs and
    // both descriptors are borrowed for the duration of the call.
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    if fds.iter().any(|fd| fd.revents & libc::POLLNVAL != 0) {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }

    Ok(Readiness {
        commands: fds[0].revents != 0,
        alert: fds[1].revents != 0,
        wake: fds[2].revents != 0,
    })
}

/// Put a descriptor into non-blocking mode.
pub fn set_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();

    // SAFETY: F_GETFL/F_SETFL only touch the status flags of a descriptor
    // that stays open for the duration of the borrow.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }

    // SAFETY: see above.
    let rc = unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
