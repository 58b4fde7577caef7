//! Domain model for graft
//!
//! Core domain types and errors:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling split by subsystem

pub mod errors;
pub mod types;

pub use types::{MethodSig, SourceLocation, ThreadId, TraceEvent};

pub use errors::{ConfigError, ExecError, SinkError, TransformError};
