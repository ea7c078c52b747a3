//! The supervisor's I/O loop.
//!
//! One [`Multiplexer`] owns the session: the PTY master, the child (through
//! its [`SignalForwarder`]), the user's input and output streams, and the
//! [`LineBuffer`]. It runs as an explicit state machine with a single
//! readiness poll per iteration:
//!
//! ```text
//! Starting -> Running -> Draining -> Terminated
//! ```
//!
//! Child output is copied to the output stream as soon as it is read. User
//! input is split into lines; each complete line goes through the
//! [`LineRewriter`] before being written to the master. Any read or write
//! failure while running is treated as end-of-stream and starts draining.

use std::io::{self, Read, Write};
use std::os::fd::AsFd;

use handoff_pty::{terminal_size, ChildControl, ChildExit, PtyError, PtyMaster, WindowSize};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::Signal;

use crate::config::SupervisorConfig;
use crate::line_buffer::LineBuffer;
use crate::rewrite::LineRewriter;
use crate::signals::SignalForwarder;

const OUTPUT_CHUNK: usize = 8192;
const INPUT_CHUNK: usize = 4096;
const BANNER_PREFIX: &str = "[handoff-supervisor]";

/// Loop state. See the module docs for the transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Starting,
    Running,
    Draining,
    Terminated,
}

/// The child's side of the session as seen by the loop.
pub trait Endpoint: Read + Write + AsFd {
    /// Called with the new size when the user's terminal is resized.
    fn window_changed(&mut self, _size: WindowSize) {}
}

impl Endpoint for PtyMaster {
    fn window_changed(&mut self, size: WindowSize) {
        if let Err(e) = self.resize(size) {
            log::warn!("{e}");
        }
    }
}

enum Flow {
    Continue,
    Eof,
}

pub struct Multiplexer<I, O, M, C> {
    input: I,
    output: O,
    master: Option<M>,
    forwarder: SignalForwarder<C>,
    rewriter: LineRewriter,
    buffer: LineBuffer,
    pending_signals: Box<dyn FnMut() -> Vec<Signal>>,
    poll_timeout: PollTimeout,
    quiet: bool,
    state: State,
    exit: Option<ChildExit>,
}

impl<I, O, M, C> Multiplexer<I, O, M, C>
where
    I: Read + AsFd,
    O: Write,
    M: Endpoint,
    C: ChildControl,
{
    pub fn new(config: &SupervisorConfig, input: I, output: O, master: M, child: C) -> Self {
        let millis = u16::try_from(config.poll_interval.as_millis()).unwrap_or(u16::MAX);
        Self {
            input,
            output,
            master: Some(master),
            forwarder: SignalForwarder::new(child),
            rewriter: LineRewriter::new(config.rewrite.clone()),
            buffer: LineBuffer::new(),
            pending_signals: Box::new(Vec::new),
            poll_timeout: PollTimeout::from(millis),
            quiet: config.quiet,
            state: State::Starting,
            exit: None,
        }
    }

    /// Set where received OS signals are collected from each iteration.
    pub fn with_signal_source(mut self, source: impl FnMut() -> Vec<Signal> + 'static) -> Self {
        self.pending_signals = Box::new(source);
        self
    }

    /// Drive the session to completion and return how the child exited.
    pub fn run(mut self) -> Result<ChildExit, PtyError> {
        while self.state != State::Terminated {
            self.advance()?;
        }
        self.exit.ok_or_else(|| {
            PtyError::Io(io::Error::other("session ended without an exit status"))
        })
    }

    /// Perform one state transition.
    pub fn advance(&mut self) -> Result<State, PtyError> {
        self.state = match self.state {
            State::Starting => {
                self.announce_start();
                State::Running
            }
            State::Running => self.step(),
            State::Draining => {
                self.drain();
                self.exit = Some(self.forwarder.child_mut().wait()?);
                State::Terminated
            }
            State::Terminated => State::Terminated,
        };
        Ok(self.state)
    }

    fn step(&mut self) -> State {
        for signal in (self.pending_signals)() {
            self.handle_signal(signal);
        }

        let child_alive = self.forwarder.child_alive();
        let (master_ready, input_ready) = match self.poll_ready(child_alive) {
            Ok(ready) => ready,
            Err(Errno::EINTR) => return State::Running,
            Err(e) => {
                log::debug!("poll failed: {e}");
                return State::Draining;
            }
        };

        if master_ready {
            if let Flow::Eof = self.pump_output() {
                return State::Draining;
            }
        }

        if child_alive && input_ready {
            if let Flow::Eof = self.pump_input() {
                return State::Draining;
            }
        }

        // Child is gone and its output is fully drained.
        if !child_alive && !master_ready {
            return State::Draining;
        }

        State::Running
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::SIGWINCH => {
                let Some(size) = terminal_size(self.input.as_fd()) else {
                    return;
                };
                if let Some(master) = self.master.as_mut() {
                    master.window_changed(size);
                }
            }
            _ => {
                self.forwarder.forward(signal);
            }
        }
    }

    /// Wait for readiness on the master and, while the child lives, the input.
    fn poll_ready(&self, child_alive: bool) -> Result<(bool, bool), Errno> {
        let Some(master) = self.master.as_ref() else {
            return Ok((false, false));
        };

        let mut fds = vec![PollFd::new(master.as_fd(), PollFlags::POLLIN)];
        if child_alive {
            fds.push(PollFd::new(self.input.as_fd(), PollFlags::POLLIN));
        }
        poll(&mut fds, self.poll_timeout)?;

        // Hangups and errors are readable too: the read reports them as EOF.
        let readable =
            PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL;
        let ready = |fd: &PollFd| fd.revents().is_some_and(|r| r.intersects(readable));
        Ok((ready(&fds[0]), fds.get(1).is_some_and(ready)))
    }

    /// Copy one chunk of child output to the output stream, unmodified.
    fn pump_output(&mut self) -> Flow {
        let Some(master) = self.master.as_mut() else {
            return Flow::Eof;
        };

        let mut buf = [0u8; OUTPUT_CHUNK];
        let n = match master.read(&mut buf) {
            Ok(0) => return Flow::Eof,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Flow::Continue,
            Err(e) => {
                log::debug!("PTY read ended: {e}");
                return Flow::Eof;
            }
        };

        let written = self
            .output
            .write_all(&buf[..n])
            .and_then(|()| self.output.flush());
        if let Err(e) = written {
            log::debug!("output write failed: {e}");
            return Flow::Eof;
        }
        Flow::Continue
    }

    /// Read user input and forward every complete line to the child.
    fn pump_input(&mut self) -> Flow {
        let mut buf = [0u8; INPUT_CHUNK];
        let n = match self.input.read(&mut buf) {
            Ok(0) => return Flow::Eof,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Flow::Continue,
            Err(e) => {
                log::debug!("input read ended: {e}");
                return Flow::Eof;
            }
        };
        self.buffer.extend(&buf[..n]);

        while let Some(line) = self.buffer.next_line() {
            let rewritten = self.rewriter.rewrite(&line, true);
            let replaced = rewritten.is_replaced();
            let mut payload = Vec::with_capacity(rewritten.as_bytes().len() + 1);
            payload.extend_from_slice(rewritten.as_bytes());
            payload.push(b'\n');

            if replaced {
                self.announce_replacement("");
            }
            if let Err(e) = self.write_master(&payload) {
                log::debug!("PTY write failed: {e}");
                return Flow::Eof;
            }
        }
        Flow::Continue
    }

    /// Flush the unterminated remainder (if the child can still take it),
    /// then close the master.
    fn drain(&mut self) {
        let remainder = self.buffer.take_remainder();
        if !remainder.is_empty() {
            if self.forwarder.child_alive() {
                let rewritten = self.rewriter.rewrite(&remainder, false);
                let replaced = rewritten.is_replaced();
                let payload = rewritten.as_bytes().to_vec();

                if replaced {
                    self.announce_replacement("trailing ");
                }
                if let Err(e) = self.write_master(&payload) {
                    log::debug!("could not flush buffered input: {e}");
                }
            } else {
                let discarded = remainder.len();
                log::debug!("child exited, discarding {discarded} buffered bytes");
            }
        }

        if self.master.take().is_some() {
            log::debug!("closed PTY master");
        }
    }

    fn write_master(&mut self, bytes: &[u8]) -> io::Result<()> {
        let master = self
            .master
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;
        master.write_all(bytes)?;
        master.flush()
    }

    fn announce_start(&mut self) {
        let msg = match self.rewriter.rule() {
            Some(rule) => format!(
                "Supervisor active. {} will be rewritten to {}.",
                rule.trigger(),
                rule.replacement()
            ),
            None => "Supervisor active. Rewriting disabled.".to_string(),
        };
        self.announce(&msg);
    }

    fn announce_replacement(&mut self, which: &str) {
        let Some(rule) = self.rewriter.rule() else {
            return;
        };
        let msg = format!(
            "Replaced {which}'{}' with '{}'.",
            rule.trigger(),
            rule.replacement()
        );
        self.announce(&msg);
    }

    /// Informational line on the output stream, unless quiet.
    fn announce(&mut self, msg: &str) {
        if self.quiet {
            return;
        }
        let line = format!("\n{BANNER_PREFIX} {msg}\n");
        let written = self
            .output
            .write_all(line.as_bytes())
            .and_then(|()| self.output.flush());
        if let Err(e) = written {
            log::debug!("could not write supervisor message: {e}");
        }
    }
}
