//! Terminal primitives for in-process terminal testing
//!
//! This crate provides the two operating-system and emulation pieces a
//! test session is built from: a PTY pair with no child attached, and a
//! fixed-size character grid driven by alacritty_terminal, plus an
//! incremental escape-sequence stripper for matching on raw output.

pub mod grid;
pub mod pty;
pub mod strip;

pub use grid::{Cursor, Grid};
pub use pty::{Pty, PtyError, ReadStatus};
pub use strip::AnsiStripper;
