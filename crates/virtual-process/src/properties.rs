//! # Process Properties
//!
//! A [`ProcessProperties`] value is a packed four-part descriptor {subject, major,
//! minor, mode} that doubles as a process's identity tag and as a query pattern.
//! Each part is either a concrete `u16` or the wildcard `0`.
//!
//! ## Matching
//!
//! Matching is deliberately one-directional: a *pattern* part of `0` matches any
//! concrete part, but a concrete pattern part only matches an equal concrete part.
//! `pattern.matches(&concrete)` is therefore neither reflexive over wildcarded
//! values nor symmetric: `{S,0,0,0}` matches `{S,1,2,1}` while the reverse does
//! not hold. Group addressing ("all processes with subject S") is built entirely
//! on this rule.

/// Well-known subject values. Subjects below [`ProcessSubject::FIRST_APPLICATION`]
/// are reserved for the runtime's own processes; applications start their own
/// subject numbering there.
pub struct ProcessSubject;

impl ProcessSubject {
    pub const INVALID: u16 = 0;
    pub const CONCURRENCY_MANAGER: u16 = 1;
    pub const LOGGING: u16 = 2;
    pub const FIRST_APPLICATION: u16 = 3;
}

/// Packed four-part identity/query descriptor with per-part wildcarding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProcessProperties {
    subject: u16,
    major: u16,
    minor: u16,
    mode: u16,
}

/// Properties of the concurrency manager's own pseudo-process.
pub const MANAGER_PROCESS_PROPERTIES: ProcessProperties =
    ProcessProperties::with_parts(ProcessSubject::CONCURRENCY_MANAGER, 1, 1, 1);

/// Properties of the logging process.
pub const LOGGING_PROCESS_PROPERTIES: ProcessProperties =
    ProcessProperties::with_parts(ProcessSubject::LOGGING, 1, 1, 1);

impl ProcessProperties {
    /// Builds a concrete properties value for `subject`, with the remaining parts
    /// defaulted to 1 (the conventional "first/only" value).
    pub const fn new(subject: u16) -> Self {
        Self::with_parts(subject, 1, 1, 1)
    }

    pub const fn with_parts(subject: u16, major: u16, minor: u16, mode: u16) -> Self {
        Self {
            subject,
            major,
            minor,
            mode,
        }
    }

    /// The all-wildcard pattern; matches every concrete properties value.
    pub const fn wildcard() -> Self {
        Self::with_parts(0, 0, 0, 0)
    }

    pub fn subject(&self) -> u16 {
        self.subject
    }

    pub fn major_part(&self) -> u16 {
        self.major
    }

    pub fn minor_part(&self) -> u16 {
        self.minor
    }

    pub fn mode_part(&self) -> u16 {
        self.mode
    }

    /// The four parts packed into a single word, for compact logging.
    pub fn raw_value(&self) -> u64 {
        (self.subject as u64)
            | (self.major as u64) << 16
            | (self.minor as u64) << 32
            | (self.mode as u64) << 48
    }

    /// A process's own identity tag must be fully concrete; wildcards are only
    /// meaningful in query patterns.
    pub fn is_valid(&self) -> bool {
        self.subject != 0 && self.major != 0 && self.minor != 0 && self.mode != 0
    }

    /// Treats `self` as a pattern and tests it against a concrete properties set.
    /// A part matches when it is the wildcard `0` or equals the concrete part.
    pub fn matches(&self, concrete: &ProcessProperties) -> bool {
        Self::part_matches(self.subject, concrete.subject)
            && Self::part_matches(self.major, concrete.major)
            && Self::part_matches(self.minor, concrete.minor)
            && Self::part_matches(self.mode, concrete.mode)
    }

    fn part_matches(pattern: u16, concrete: u16) -> bool {
        pattern == 0 || pattern == concrete
    }
}
