use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use portable_pty::CommandBuilder;

use crate::pty::{PtyError, PtySlave};

/// How a child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Exited(i32),
    Signaled(Signal),
}

impl ChildExit {
    /// Process exit code to report for this termination, using the shell's
    /// `128 + signal` convention for signal deaths.
    pub fn code(&self) -> i32 {
        match self {
            ChildExit::Exited(code) => *code,
            ChildExit::Signaled(signal) => 128 + *signal as i32,
        }
    }
}

/// Liveness, reaping and signal delivery for the supervised child.
pub trait ChildControl {
    /// Non-blocking exit check. Returns `Ok(None)` while the child runs.
    fn try_wait(&mut self) -> Result<Option<ChildExit>, PtyError>;

    /// Block until the child terminates.
    fn wait(&mut self) -> Result<ChildExit, PtyError>;

    /// Deliver `signal` to the child.
    fn signal(&mut self, signal: Signal) -> Result<(), PtyError>;

    fn is_alive(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }
}

/// A process running on the slave side of a PTY.
///
/// The exit status is collected with `waitpid` so that signal deaths keep
/// their signal number. Once observed it is cached, so the child is reaped
/// exactly once no matter how often `try_wait`/`wait` are called.
pub struct ChildProcess {
    pid: Pid,
    exit: Option<ChildExit>,
    _child: Box<dyn portable_pty::Child + Send + Sync>,
}

impl ChildProcess {
    /// Spawn `program` with `args` on the slave side of a PTY.
    ///
    /// The child inherits the supervisor's environment and working directory.
    /// The parent's copy of the slave is closed before this returns.
    pub fn spawn(program: &str, args: &[String], slave: PtySlave) -> Result<Self, PtyError> {
        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let spawned = slave.slave.spawn_command(cmd);
        drop(slave);

        let child = spawned.map_err(|e| PtyError::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        let pid = child.process_id().ok_or_else(|| PtyError::Spawn {
            program: program.to_string(),
            reason: "child has no process id".to_string(),
        })?;
        let pid = Pid::from_raw(pid as i32);

        log::debug!("spawned {program} as pid {pid}");

        Ok(Self {
            pid,
            exit: None,
            _child: child,
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    fn record(&mut self, status: WaitStatus) -> Option<ChildExit> {
        let exit = match status {
            WaitStatus::Exited(_, code) => ChildExit::Exited(code),
            WaitStatus::Signaled(_, signal, _) => ChildExit::Signaled(signal),
            _ => return None,
        };
        log::debug!("child {} terminated: {exit:?}", self.pid);
        self.exit = Some(exit);
        Some(exit)
    }
}

impl ChildControl for ChildProcess {
    fn try_wait(&mut self) -> Result<Option<ChildExit>, PtyError> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => Ok(self.record(status)),
            Err(e) => Err(PtyError::Wait(e)),
        }
    }

    fn wait(&mut self) -> Result<ChildExit, PtyError> {
        loop {
            if let Some(exit) = self.exit {
                return Ok(exit);
            }
            match waitpid(self.pid, None) {
                Ok(status) => {
                    self.record(status);
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(PtyError::Wait(e)),
            }
        }
    }

    fn signal(&mut self, signal: Signal) -> Result<(), PtyError> {
        kill(self.pid, signal).map_err(PtyError::Signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty::{allocate, PtyMaster, WindowSize};
    use std::thread;
    use std::time::{Duration, Instant};

    // The master is returned so the child does not get SIGHUP mid-test.
    fn spawn(program: &str, args: &[&str]) -> Result<(PtyMaster, ChildProcess), PtyError> {
        let (master, slave) = allocate(WindowSize::default())?;
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let child = ChildProcess::spawn(program, &args, slave)?;
        Ok((master, child))
    }

    #[test]
    fn test_spawn_and_wait_exit_code() {
        let (_master, mut child) = spawn("/bin/sh", &["-c", "exit 3"]).unwrap();
        assert_eq!(child.wait().unwrap(), ChildExit::Exited(3));
    }

    #[test]
    fn test_spawn_missing_program() {
        let result = spawn("/nonexistent/handoff-test-binary", &[]);
        assert!(
            matches!(result, Err(PtyError::Spawn { .. })),
            "Expected spawn error, got: {:?}",
            result.as_ref().err()
        );
    }

    #[test]
    fn test_try_wait_while_running() {
        let (_master, mut child) = spawn("sleep", &["5"]).unwrap();
        assert!(child.is_alive());
        assert_eq!(child.try_wait().unwrap(), None);

        child.signal(Signal::SIGKILL).unwrap();
        assert_eq!(child.wait().unwrap(), ChildExit::Signaled(Signal::SIGKILL));
    }

    #[test]
    fn test_signal_terminates_child() {
        let (_master, mut child) = spawn("sleep", &["5"]).unwrap();
        child.signal(Signal::SIGINT).unwrap();

        let exit = child.wait().unwrap();
        assert_eq!(exit, ChildExit::Signaled(Signal::SIGINT));
        assert_eq!(exit.code(), 130);
    }

    #[test]
    fn test_exit_status_is_cached_after_reap() {
        let (_master, mut child) = spawn("/bin/sh", &["-c", "exit 0"]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(3);
        while child.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        assert_eq!(child.try_wait().unwrap(), Some(ChildExit::Exited(0)));
        // The pid is already reaped; the cached status must be returned.
        assert_eq!(child.wait().unwrap(), ChildExit::Exited(0));
        assert_eq!(child.try_wait().unwrap(), Some(ChildExit::Exited(0)));
    }

    #[test]
    fn test_exit_code_encoding() {
        assert_eq!(ChildExit::Exited(0).code(), 0);
        assert_eq!(ChildExit::Exited(3).code(), 3);
        assert_eq!(ChildExit::Signaled(Signal::SIGTERM).code(), 143);
    }
}
