//! PTY (pseudo-terminal) management
//!
//! Opens a master/slave pair with no child process attached. The master is
//! read by the session's pump and written with test input; the slave (tty)
//! is handed to the program under test.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;

use rustix::termios::{tcgetattr, tcsetattr, tcsetwinsize, LocalModes, OptionalActions, Winsize};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("failed to open PTY: {0}")]
    Open(std::io::Error),

    #[error("failed to configure tty: {0}")]
    Termios(rustix::io::Errno),

    #[error("failed to set window size: {0}")]
    Winsize(rustix::io::Errno),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn errno_to_io(e: rustix::io::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e.raw_os_error())
}

/// Result of a non-blocking read from the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes were read into the buffer
    Data(usize),

    /// Nothing available right now
    Empty,

    /// Every slave handle is closed; nothing more will arrive
    Closed,
}

/// Master side of a PTY pair
pub struct Pty {
    /// Master side of PTY (for reading/writing), always non-blocking
    master: File,

    /// Current window size
    winsize: Winsize,
}

impl Pty {
    /// Open a PTY pair sized `cols` x `rows`
    ///
    /// Returns the master and the slave (tty) file. The tty keeps echo and
    /// output post-processing on, but control characters are echoed raw so
    /// escape sequences written as input reach the stream unchanged.
    pub fn open(cols: u16, rows: u16) -> Result<(Self, File), PtyError> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        // Open PTY master/slave pair
        let master_fd = rustix::pty::openpt(rustix::pty::OpenptFlags::RDWR | rustix::pty::OpenptFlags::NOCTTY)
            .map_err(|e| PtyError::Open(errno_to_io(e)))?;

        // Grant access and unlock
        rustix::pty::grantpt(&master_fd).map_err(|e| PtyError::Open(errno_to_io(e)))?;
        rustix::pty::unlockpt(&master_fd).map_err(|e| PtyError::Open(errno_to_io(e)))?;

        // Get slave name
        let slave_name_buf = [0u8; 256];
        let slave_name = rustix::pty::ptsname(&master_fd, slave_name_buf)
            .map_err(|e| PtyError::Open(errno_to_io(e)))?;

        let slave_path = slave_name.to_str()
            .map_err(|_| PtyError::Open(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "invalid PTY slave name",
            )))?;

        tcsetwinsize(&master_fd, winsize).map_err(PtyError::Winsize)?;

        let slave = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(slave_path)
            .map_err(PtyError::Open)?;

        // ECHOCTL would turn ESC into "^[" on the way back
        let mut termios = tcgetattr(&slave).map_err(PtyError::Termios)?;
        termios.local_modes.remove(LocalModes::ECHOCTL);
        tcsetattr(&slave, OptionalActions::Now, &termios).map_err(PtyError::Termios)?;

        // Non-blocking once, up front: the flag lives on the shared open file
        // description, so toggling it per call would race between the pump
        // thread and writers.
        let flags = rustix::fs::fcntl_getfl(&master_fd).map_err(errno_to_io)?;
        rustix::fs::fcntl_setfl(&master_fd, flags | rustix::fs::OFlags::NONBLOCK)
            .map_err(errno_to_io)?;

        let master = File::from(master_fd);

        tracing::debug!(slave = slave_path, cols, rows, "opened PTY pair");

        Ok((Self { master, winsize }, slave))
    }

    /// Read available data from the master (non-blocking)
    pub fn read(&self, buf: &mut [u8]) -> Result<ReadStatus, PtyError> {
        match (&self.master).read(buf) {
            Ok(0) => Ok(ReadStatus::Closed),
            Ok(n) => Ok(ReadStatus::Data(n)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(ReadStatus::Empty),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(ReadStatus::Empty),
            // Linux reports a hung-up slave as EIO on the master
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(ReadStatus::Closed),
            Err(e) => Err(PtyError::Io(e)),
        }
    }

    /// Write data to the master (non-blocking)
    ///
    /// Returns the number of bytes written. If the PTY buffer is full, returns 0
    /// instead of blocking. The caller should buffer any unwritten data and retry later.
    pub fn write(&self, data: &[u8]) -> Result<usize, PtyError> {
        match (&self.master).write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(PtyError::Io(e)),
        }
    }

    /// Get current window size as (cols, rows)
    pub fn winsize(&self) -> (u16, u16) {
        (self.winsize.ws_col, self.winsize.ws_row)
    }
}

impl std::fmt::Debug for Pty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pty")
            .field("fd", &self.master.as_raw_fd())
            .field("winsize", &self.winsize())
            .finish()
    }
}
