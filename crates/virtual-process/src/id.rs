//! # Process Identity
//!
//! Every virtual process is identified by a [`ProcessId`] for the lifetime of the
//! runtime. Ids are allocated by the concurrency manager, are never reused, and two
//! of them are reserved for the runtime's own processes: the manager itself and the
//! logging process.

use std::fmt;

/// Unique identity of a virtual process instance.
///
/// Ids are small value types handed out by the concurrency manager. An id is never
/// reallocated while the runtime lives, so a stale id is merely unreachable (sends
/// to it are silently absorbed), never aliased to a different process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// Sentinel for a process that has not been registered yet.
    pub const INVALID: ProcessId = ProcessId(0);

    /// Reserved id of the concurrency manager.
    pub const MANAGER: ProcessId = ProcessId(1);

    /// Reserved id of the logging process.
    pub const LOGGING: ProcessId = ProcessId(2);

    /// First id available for dynamically spawned processes.
    pub const FIRST_FREE: ProcessId = ProcessId(3);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// True for the ids the runtime reserves for itself.
    pub fn is_reserved(self) -> bool {
        self == Self::MANAGER || self == Self::LOGGING
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids_are_distinct_and_valid() {
        assert!(ProcessId::MANAGER.is_valid());
        assert!(ProcessId::LOGGING.is_valid());
        assert_ne!(ProcessId::MANAGER, ProcessId::LOGGING);
        assert!(!ProcessId::INVALID.is_valid());
        assert!(ProcessId::MANAGER.is_reserved());
        assert!(!ProcessId::FIRST_FREE.is_reserved());
    }
}
