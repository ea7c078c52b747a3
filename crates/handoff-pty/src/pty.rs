use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

use portable_pty::{native_pty_system, MasterPty, PtySize, SlavePty};

/// Errors from PTY operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("PTY allocation failed: {0}")]
    Allocation(String),
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("failed to wait for child: {0}")]
    Wait(#[source] nix::Error),
    #[error("failed to signal child: {0}")]
    Signal(#[source] nix::Error),
    #[error("PTY resize failed: {0}")]
    Resize(String),
    #[error("PTY I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl From<WindowSize> for PtySize {
    fn from(size: WindowSize) -> Self {
        PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

nix::ioctl_read_bad!(tiocgwinsz, nix::libc::TIOCGWINSZ, nix::libc::winsize);

/// Read the window size of the terminal behind `fd`.
///
/// Returns `None` when `fd` is not a terminal or reports a zero-sized window.
pub fn terminal_size(fd: BorrowedFd<'_>) -> Option<WindowSize> {
    let mut ws = nix::libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ only writes into the winsize struct we own.
    let res = unsafe { tiocgwinsz(fd.as_raw_fd(), &mut ws) };
    match res {
        Ok(_) if ws.ws_row > 0 && ws.ws_col > 0 => Some(WindowSize {
            rows: ws.ws_row,
            cols: ws.ws_col,
        }),
        _ => None,
    }
}

/// Slave side of a freshly allocated PTY. Consumed by [`crate::ChildProcess::spawn`],
/// which drops it right after the child is started.
pub struct PtySlave {
    pub(crate) slave: Box<dyn SlavePty + Send>,
}

/// Master side of the PTY: the supervisor's only handle on the child's terminal.
///
/// Reads return child output. Writes go straight to the master descriptor.
pub struct PtyMaster {
    master: Box<dyn MasterPty + Send>,
    reader: Box<dyn Read + Send>,
    fd: RawFd,
}

/// Allocate a new PTY pair sized to `size`.
pub fn allocate(size: WindowSize) -> Result<(PtyMaster, PtySlave), PtyError> {
    let pty_system = native_pty_system();

    let pair = pty_system
        .openpty(size.into())
        .map_err(|e| PtyError::Allocation(format!("failed to open PTY: {e}")))?;

    let fd = pair
        .master
        .as_raw_fd()
        .ok_or_else(|| PtyError::Allocation("PTY master has no file descriptor".to_string()))?;

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| PtyError::Allocation(format!("failed to clone reader: {e}")))?;

    log::debug!("allocated PTY {}x{} (master fd {fd})", size.cols, size.rows);

    Ok((
        PtyMaster {
            master: pair.master,
            reader,
            fd,
        },
        PtySlave { slave: pair.slave },
    ))
}

impl PtyMaster {
    /// Resize the PTY to new dimensions.
    pub fn resize(&self, size: WindowSize) -> Result<(), PtyError> {
        self.master
            .resize(size.into())
            .map_err(|e| PtyError::Resize(format!("{e}")))
    }
}

impl Read for PtyMaster {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

// portable-pty's `take_writer` sends EOF to the child when dropped, so input
// is written to the master descriptor directly.
impl Write for PtyMaster {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        nix::unistd::write(self.as_fd(), buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsFd for PtyMaster {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: `fd` belongs to `self.master`, which lives as long as `self`.
        unsafe { BorrowedFd::borrow_raw(self.fd) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_allocate_pty() {
        let pair = allocate(WindowSize::default());
        assert!(pair.is_ok(), "Failed to allocate PTY: {:?}", pair.err());
    }

    #[test]
    fn test_resize() {
        let (master, _slave) = allocate(WindowSize::default()).unwrap();
        let result = master.resize(WindowSize {
            rows: 40,
            cols: 120,
        });
        assert!(result.is_ok(), "Resize failed: {:?}", result.err());
    }

    #[test]
    fn test_master_reports_its_window_size() {
        let size = WindowSize {
            rows: 33,
            cols: 101,
        };
        let (master, _slave) = allocate(size).unwrap();
        assert_eq!(terminal_size(master.as_fd()), Some(size));
    }

    #[test]
    fn test_terminal_size_of_non_tty() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert_eq!(terminal_size(a.as_fd()), None);
    }

    #[test]
    fn test_default_window_size() {
        let size = WindowSize::default();
        assert_eq!((size.cols, size.rows), (80, 24));
    }
}
