//! # Process Sample
//!
//! A small topology on top of the `virtual-process` runtime: a player process
//! that issues database tasks and a mock database process that executes them.
//! The database messages are ordinary payload types defined here, with no
//! framework support behind them; they ride the same mailbox substrate as
//! everything else.

pub mod database;
pub mod messages;
pub mod player;

use virtual_process::ProcessSubject;

/// Subject of the player process.
pub const SUBJECT_PLAYER: u16 = ProcessSubject::FIRST_APPLICATION;

/// Subject of the mock database process.
pub const SUBJECT_DATABASE: u16 = ProcessSubject::FIRST_APPLICATION + 1;
