//! Session startup: allocate the PTY, spawn the child, wire up the user's
//! terminal and hand everything to the [`Multiplexer`].

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};

use handoff_pty::{allocate, terminal_size, ChildExit, ChildProcess, PtyError};

use crate::config::SupervisorConfig;
use crate::multiplexer::Multiplexer;
use crate::signals;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Pty(#[from] PtyError),
    #[error("cannot access the terminal: {0}")]
    Terminal(#[source] io::Error),
}

/// Run one supervised session on the process's own stdin/stdout.
///
/// Allocation and spawn failures return before any I/O happens; every other
/// path ends with the child's exit status.
pub fn run(config: &SupervisorConfig) -> Result<ChildExit, SessionError> {
    // Unbuffered handles on fds 0 and 1, so readiness and reads stay in step.
    let input = duplicate(io::stdin().as_fd())?;
    let output = duplicate(io::stdout().as_fd())?;

    let size = terminal_size(input.as_fd()).unwrap_or_default();
    let (master, slave) = allocate(size)?;
    let child = ChildProcess::spawn(&config.program, &config.args, slave)?;
    log::info!("supervising {} (pid {})", config.program, child.pid());

    if let Err(e) = signals::install() {
        log::warn!("signal handlers not installed, signals will not be forwarded: {e}");
    }

    let exit = Multiplexer::new(config, input, output, master, child)
        .with_signal_source(signals::take_pending)
        .run()?;
    log::info!("{} exited: {exit:?}", config.program);
    Ok(exit)
}

fn duplicate(fd: BorrowedFd<'_>) -> Result<File, SessionError> {
    let owned = fd.try_clone_to_owned().map_err(SessionError::Terminal)?;
    Ok(File::from(owned))
}
