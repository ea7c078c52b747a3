//! handoff-pty: PTY allocation and child process lifecycle for the handoff supervisor.
//!
//! # Architecture
//!
//! - [`allocate`] — Opens a PTY pair, returning the [`PtyMaster`] kept by the
//!   supervisor and the [`PtySlave`] handed to the child.
//! - [`ChildProcess`] — Spawns the target program on the slave side, tracks
//!   liveness, delivers signals and reaps the exit status exactly once.
//! - [`ChildControl`] — The seam the supervisor loop drives the child through.

pub mod child;
pub mod pty;

pub use child::{ChildControl, ChildExit, ChildProcess};
pub use pty::{allocate, terminal_size, PtyError, PtyMaster, PtySlave, WindowSize};
