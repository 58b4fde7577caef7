//! Structured error types for graft
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! The split mirrors the propagation policy: `TransformError` is contained
//! at method granularity, `ConfigError` and `SinkError` are fatal for the
//! process, `ExecError` surfaces to whoever drives the harness.

use graft_common::DecodeError;
use std::path::PathBuf;
use thiserror::Error;

/// A specific method could not be rewritten. Recoverable: the engine skips
/// the method, keeps its original body and continues with the unit.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("malformed body in `{sig}`: {source}")]
    MalformedBody { sig: String, source: DecodeError },

    #[error("unresolved reference `{reference}` in `{sig}`")]
    UnresolvedReference { sig: String, reference: String },
}

/// Required logger state missing or inconsistent at startup. Fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("trace output directory was never configured")]
    OutputDirMissing,

    #[error("logger already initialized with output directory {existing}")]
    AlreadyInitialized { existing: PathBuf },
}

/// A trace sink could not be created. Fatal: tracing integrity cannot be
/// partially guaranteed.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to create trace directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[error("failed to create trace sink {path}: {source}")]
    Create { path: PathBuf, source: std::io::Error },
}

/// Failure while executing a method through the harness.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("unknown unit `{0}`")]
    UnknownUnit(String),

    #[error("unknown method `{0}`")]
    UnknownMethod(String),

    #[error("method `{0}` has no body to execute")]
    NotConcrete(String),

    #[error("failure raised by `{sig}`: {message}")]
    Failure { sig: String, message: String },

    #[error("undecodable body in `{sig}`: {source}")]
    BadBody { sig: String, source: DecodeError },
}
