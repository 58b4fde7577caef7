//! Domain types providing compile-time safety and self-documentation
//!
//! Newtype wrappers prevent mixing up the many strings and ids flowing
//! through the tracer, and make function signatures more expressive.

use std::fmt;

/// Logical thread id assigned by the tracing context.
///
/// This is NOT the OS thread id. Logical ids are minted from a process-wide
/// counter so that a ThreadStart event can carry the new thread's id before
/// the spawn proceeds, and so trace file names are stable across platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully qualified method signature (validated, non-empty)
///
/// Example: `com.example.Foo.bar()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig(String);

impl MethodSig {
    /// Create a new signature (panics if empty)
    pub fn new(sig: impl Into<String>) -> Self {
        let sig = sig.into();
        assert!(!sig.is_empty(), "Method signature cannot be empty");
        Self(sig)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MethodSig {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for MethodSig {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Source location of a call site, as recorded in trace lines.
///
/// `Unknown` is the sentinel for invocations with no recorded call site,
/// e.g. a method invoked directly from program entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Known { file: String, line: u32 },
    Unknown,
}

impl SourceLocation {
    pub fn known(file: impl Into<String>, line: u32) -> Self {
        Self::Known { file: file.into(), line }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known { file, line } => write!(f, "{file} : {line}"),
            Self::Unknown => write!(f, "unknown : 0"),
        }
    }
}

/// One probe-emitted event, routed through the profiling logger.
///
/// The emitting thread is identified by the sink the event is written to;
/// only ThreadStart names another thread - the one about to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    MethodStart { sig: MethodSig, caller: SourceLocation },
    MethodDuration { sig: MethodSig, nanos: u64 },
    ThreadStart { new_thread: ThreadId, caller: SourceLocation },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_display() {
        assert_eq!(ThreadId(7).to_string(), "7");
    }

    #[test]
    fn test_method_sig() {
        let sig = MethodSig::new("com.example.Foo.bar()");
        assert_eq!(sig.as_str(), "com.example.Foo.bar()");
        assert_eq!(sig.to_string(), "com.example.Foo.bar()");
    }

    #[test]
    #[should_panic(expected = "Method signature cannot be empty")]
    fn test_empty_method_sig_panics() {
        MethodSig::new("");
    }

    #[test]
    fn test_source_location_display() {
        assert_eq!(SourceLocation::known("Foo.unit", 12).to_string(), "Foo.unit : 12");
        assert_eq!(SourceLocation::Unknown.to_string(), "unknown : 0");
    }
}
