//! # System Messages
//!
//! The built-in message vocabulary spoken between the concurrency manager and
//! every managed process. Application messages are arbitrary types; these are the
//! ones the runtime itself understands. They split into two families:
//!
//! * **Manager-bound** requests a process sends to the manager: mailbox lookups,
//!   process spawning, shutdown requests, and the final shutdown acknowledgement.
//! * **Process-bound** commands the manager sends to a process: mailbox delivery,
//!   mailbox release, and the shutdown order itself.
//!
//! Every type here is plain data plus `Debug`, so it picks up the blanket
//! [`ProcessMessage`](crate::message::ProcessMessage) implementation.

use chrono::{DateTime, Local};

use crate::id::ProcessId;
use crate::mailbox::WriteMailbox;
use crate::process::ManagedProcess;
use crate::properties::ProcessProperties;

/// Delivers another process's write mailbox, fulfilling an earlier
/// [`GetMailboxByIdRequest`] or [`GetMailboxByPropertiesRequest`], or a
/// still-open persistent request.
#[derive(Debug)]
pub struct AddMailboxMessage {
    pub mailbox: WriteMailbox,
}

impl AddMailboxMessage {
    pub fn new(mailbox: WriteMailbox) -> Self {
        Self { mailbox }
    }
}

/// Orders a process to drop every write mailbox it holds for `process_id`.
/// First phase of the two-phase shutdown of that process.
#[derive(Debug)]
pub struct ReleaseMailboxRequest {
    pub process_id: ProcessId,
}

/// Acknowledges a [`ReleaseMailboxRequest`]; sent to the manager once the
/// handles are gone. Echoes the id of the process whose mailboxes were
/// released; the acknowledging process is the frame source.
#[derive(Debug)]
pub struct ReleaseMailboxResponse {
    pub process_id: ProcessId,
}

/// Orders the receiving process to shut itself down. Soft shutdown flushes
/// queued frames to known destinations first; hard shutdown discards everything
/// except frames bound for the manager and the logging process.
#[derive(Debug)]
pub struct ShutdownSelfRequest {
    pub is_hard: bool,
}

/// Final acknowledgement a process sends the manager before terminating.
#[derive(Debug)]
pub struct ShutdownSelfResponse {
    pub is_hard: bool,
}

/// Asks the manager to shut down the process with the given id.
#[derive(Debug)]
pub struct ShutdownProcessMessage {
    pub process_id: ProcessId,
}

/// Asks the manager to shut the whole runtime down.
#[derive(Debug)]
pub struct ShutdownManagerMessage;

/// Asks the manager for the write mailbox of a specific process.
///
/// Answered at most once; if no such process exists when the request is
/// serviced, it is dropped without a reply.
#[derive(Debug)]
pub struct GetMailboxByIdRequest {
    pub target_id: ProcessId,
}

/// Asks the manager for the write mailboxes of every process whose properties
/// match `pattern` (zero parts are wildcards).
///
/// When `is_persistent` is set the request stays open: processes registered
/// later that match are delivered as they appear.
#[derive(Debug)]
pub struct GetMailboxByPropertiesRequest {
    pub pattern: ProcessProperties,
    pub is_persistent: bool,
}

/// Hands a freshly constructed process to the manager for registration and
/// worker placement. When `return_mailbox` is set, the manager sends the new
/// process's write mailbox back to the requester once registration completes.
pub struct AddNewProcessMessage {
    pub process: Box<dyn ManagedProcess>,
    pub return_mailbox: bool,
}

impl AddNewProcessMessage {
    pub fn new(process: Box<dyn ManagedProcess>, return_mailbox: bool) -> Self {
        Self {
            process,
            return_mailbox,
        }
    }
}

impl std::fmt::Debug for AddNewProcessMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddNewProcessMessage")
            .field("process_id", &self.process.id())
            .field("return_mailbox", &self.return_mailbox)
            .finish()
    }
}

/// A log line bound for the logging process. The wall-clock time is captured
/// when the request is created, not when the sink writes it, so batching and
/// flush delays never skew timestamps.
#[derive(Debug)]
pub struct LogRequestMessage {
    pub source_properties: ProcessProperties,
    pub text: String,
    pub wall_time: DateTime<Local>,
}

impl LogRequestMessage {
    pub fn new(source_properties: ProcessProperties, text: impl Into<String>) -> Self {
        Self {
            source_properties,
            text: text.into(),
            wall_time: Local::now(),
        }
    }
}
