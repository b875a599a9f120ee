//! # Virtual Process Runtime
//!
//! This crate provides a cooperative message-passing runtime for **virtual
//! processes**: units of game-backend logic that each own their state outright
//! and interact with the rest of the world only through messages. A small pool
//! of worker threads multiplexes many processes, running each one a short
//! cooperative quantum at a time; nothing is ever preempted mid-quantum, so a
//! process's state needs no locks.
//!
//! ## Architecture Overview
//!
//! The runtime separates concerns into three layers:
//!
//! 1. **Logic Layer** ([`ProcessLogic`]) - Your domain behavior: message
//!    handlers, per-quantum work, scheduled tasks
//! 2. **Process Layer** ([`VirtualProcess`], [`ProcessCore`]) - Mailboxes,
//!    dispatch, outbound frame batching, lifecycle, the task scheduler
//! 3. **Coordination Layer** ([`ConcurrencyManager`]) - The single authority
//!    over the process registry: id allocation, mailbox discovery, spawning,
//!    worker placement, and the two-phase shutdown protocol
//!
//! ## Core Abstractions
//!
//! - Any `Send + Debug + 'static` type is a message; no registration of the
//!   type itself is needed. Each process registers a typed handler per message
//!   type it understands, and dispatch routes on the concrete type with a
//!   checked downcast. Receiving an unhandled type is a programming error and
//!   panics.
//! - Messages travel in [`MessageFrame`]s: all messages a process sends to one
//!   destination within one quantum ride a single frame, so the receiving
//!   queue is locked once per sender per quantum.
//! - Peer discovery goes through the manager by id or by
//!   [`ProcessProperties`] pattern (wildcard parts), never by sharing state.
//! - Each process owns a [`TaskScheduler`] for timed work; payloads run on the
//!   owning worker thread with `&mut` access to the process core.
//!
//! ## Example
//!
//! ```rust
//! use virtual_process::{
//!     ConcurrencyManager, MemoryLogSink, ProcessCore, ProcessLogic, ProcessProperties,
//!     VirtualProcess,
//! };
//!
//! struct Greeter;
//!
//! impl ProcessLogic for Greeter {
//!     fn on_initialize(&mut self, core: &mut ProcessCore) {
//!         core.log("hello from the process substrate");
//!         core.shutdown_manager();
//!     }
//! }
//!
//! let sink = MemoryLogSink::new();
//! let mut manager = ConcurrencyManager::new(2, sink.clone()).unwrap();
//! manager
//!     .spawn_process(VirtualProcess::boxed(ProcessProperties::new(3), Greeter))
//!     .unwrap();
//! manager.run();
//!
//! assert!(sink.lines()[0].ends_with(": hello from the process substrate"));
//! ```
//!
//! ## Shutdown
//!
//! Stopping a process is a protocol, not a kill: the manager first asks every
//! other process to drop the target's mailbox handles, collects the
//! acknowledgements, and only then orders the target down. Runtime-wide
//! shutdown hard-stops everything but keeps the logging process alive until
//! last, so final log lines still land.

pub mod error;
pub mod handler;
pub mod id;
pub mod logging;
pub mod mailbox;
pub mod manager;
pub mod message;
pub mod messages;
pub mod observability;
pub mod process;
pub mod properties;
pub mod scheduler;
pub mod time;
mod worker;

// Re-export core types for convenience
pub use error::{FrameworkError, FrameworkResult};
pub use handler::HandlerRegistry;
pub use id::ProcessId;
pub use logging::{FileLogSink, LogSink, MemoryLogSink, StdoutLogSink};
pub use mailbox::{ProcessMailbox, ReadMailbox, WriteMailbox};
pub use manager::ConcurrencyManager;
pub use message::{MessageFrame, ProcessMessage};
pub use process::{ManagedProcess, ProcessBody, ProcessCore, ProcessLogic, ProcessState, VirtualProcess};
pub use properties::{ProcessProperties, ProcessSubject};
pub use scheduler::{ScheduledTask, TaskHandle, TaskPayload, TaskScheduler};
pub use time::TimeKeeper;
