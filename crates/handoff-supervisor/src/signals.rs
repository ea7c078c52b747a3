//! Signal handling for the supervisor.
//!
//! The OS handlers only raise flags. The multiplexer drains them once per
//! loop iteration with [`take_pending`] and hands interrupt/termination
//! signals to a [`SignalForwarder`], which owns the child handle.

use std::sync::atomic::{AtomicBool, Ordering};

use handoff_pty::ChildControl;
use nix::libc;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);
static SIGTERM_RECEIVED: AtomicBool = AtomicBool::new(false);
static SIGWINCH_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(signum: libc::c_int) {
    let flag = match signum {
        libc::SIGINT => &SIGINT_RECEIVED,
        libc::SIGTERM => &SIGTERM_RECEIVED,
        libc::SIGWINCH => &SIGWINCH_RECEIVED,
        _ => return,
    };
    flag.store(true, Ordering::Release);
}

/// Install the process-wide handlers for SIGINT, SIGTERM and SIGWINCH.
///
/// No `SA_RESTART`: a signal interrupts the poll so it is handled promptly.
pub fn install() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGWINCH] {
        // SAFETY: the handler only stores to atomics.
        unsafe { sigaction(signal, &action) }?;
    }
    Ok(())
}

/// Drain the signals received since the last call.
pub fn take_pending() -> Vec<Signal> {
    [
        (&SIGINT_RECEIVED, Signal::SIGINT),
        (&SIGTERM_RECEIVED, Signal::SIGTERM),
        (&SIGWINCH_RECEIVED, Signal::SIGWINCH),
    ]
    .into_iter()
    .filter(|(flag, _)| flag.swap(false, Ordering::AcqRel))
    .map(|(_, signal)| signal)
    .collect()
}

/// What happened to a signal handed to [`SignalForwarder::forward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Forwarded,
    /// The child had already exited.
    Swallowed,
    Failed,
}

/// Relays process-control signals to the child while it is alive.
pub struct SignalForwarder<C> {
    child: C,
}

impl<C: ChildControl> SignalForwarder<C> {
    pub fn new(child: C) -> Self {
        Self { child }
    }

    pub fn child_mut(&mut self) -> &mut C {
        &mut self.child
    }

    pub fn child_alive(&mut self) -> bool {
        self.child.is_alive()
    }

    /// Forward `signal` to the child. Never fails: delivery errors are logged.
    pub fn forward(&mut self, signal: Signal) -> Delivery {
        if !self.child.is_alive() {
            log::debug!("child already exited, dropping {signal}");
            return Delivery::Swallowed;
        }
        match self.child.signal(signal) {
            Ok(()) => {
                log::debug!("forwarded {signal} to child");
                Delivery::Forwarded
            }
            Err(e) => {
                log::warn!("could not forward {signal}: {e}");
                Delivery::Failed
            }
        }
    }
}
