//! Per-thread trace sinks and the trace line format.
//!
//! The registry maps logical thread ids to sinks and is the only shared
//! mutable state here: lookup/insert is serialized by one mutex, and after
//! creation a sink is written exclusively by its owning thread, so writes
//! need no locking at all.
//!
//! Line grammar:
//!
//! ```text
//! line      := indent label " : " value
//! indent    := TAB * depth
//! label     := methodSignature | "Thread.start()"
//! value     := "(" callerLocation ")"      -- start events
//!            | durationNanos               -- duration events
//!            | newThreadId                 -- second line of thread-start
//! ```
//!
//! Failures here follow the process-wide policy: a sink that cannot be
//! created, or a missing output directory configuration, terminates the
//! process with a non-zero status - partial trace data is worse than none.

use crate::context;
use crate::domain::{ConfigError, MethodSig, SinkError, SourceLocation, ThreadId, TraceEvent};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

const SINK_PREFIX: &str = "thread_";
const SINK_EXT: &str = "txt";

/// Exit status when tracing cannot be kept consistent.
pub const EXIT_TRACING_FATAL: i32 = 1;

static OUT_DIR: OnceLock<PathBuf> = OnceLock::new();
static REGISTRY: OnceLock<Mutex<HashMap<ThreadId, Arc<ProfileLogger>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<ThreadId, Arc<ProfileLogger>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Configures the base output directory. Init-on-first-use: the first call
/// wins, a repeat with the same path is a no-op, and a conflicting repeat
/// is an error the bootstrap must treat as fatal.
pub fn init(out_dir: impl Into<PathBuf>) -> Result<(), ConfigError> {
    let dir = out_dir.into();
    let stored = OUT_DIR.get_or_init(|| dir.clone());
    if *stored == dir {
        Ok(())
    } else {
        Err(ConfigError::AlreadyInitialized { existing: stored.clone() })
    }
}

/// The configured output directory, if `init` has run.
pub fn output_dir() -> Option<&'static Path> {
    OUT_DIR.get().map(PathBuf::as_path)
}

/// File name of the sink owned by `tid`.
pub fn sink_file_name(tid: ThreadId) -> String {
    format!("{SINK_PREFIX}{tid}.{SINK_EXT}")
}

/// Full path of the sink owned by `tid`, once `init` has run.
pub fn sink_path(tid: ThreadId) -> Option<PathBuf> {
    output_dir().map(|dir| dir.join(sink_file_name(tid)))
}

/// Renders one event at the given nesting depth, trailing newline included.
/// ThreadStart renders as two lines sharing one indent.
pub fn format_event(event: &TraceEvent, depth: usize) -> String {
    let indent = "\t".repeat(depth);
    match event {
        TraceEvent::MethodStart { sig, caller } => format!("{indent}{sig} : ({caller})\n"),
        TraceEvent::MethodDuration { sig, nanos } => format!("{indent}{sig} : {nanos}\n"),
        TraceEvent::ThreadStart { new_thread, caller } => format!(
            "{indent}Thread.start() : ({caller})\n{indent}Thread.start() : {new_thread}\n"
        ),
    }
}

/// A thread's append-only trace sink.
///
/// One instance per thread, created lazily by [`ProfileLogger::instance`]
/// and owned by that thread for the rest of the process lifetime.
#[derive(Debug)]
pub struct ProfileLogger {
    tid: ThreadId,
    out: File,
}

impl ProfileLogger {
    /// Returns the calling thread's sink, creating and registering it on
    /// the thread's first call. Repeated calls from one thread return the
    /// identical sink; distinct threads get distinct sinks.
    pub fn instance() -> Arc<Self> {
        let tid = context::current_thread_id();
        let mut map = registry().lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = map.get(&tid) {
            return Arc::clone(existing);
        }
        let logger = match Self::create(tid) {
            Ok(logger) => Arc::new(logger),
            Err(err) => fatal(&err),
        };
        map.insert(tid, Arc::clone(&logger));
        logger
    }

    fn create(tid: ThreadId) -> Result<Self, SinkError> {
        let Some(base) = OUT_DIR.get() else {
            fatal(&ConfigError::OutputDirMissing);
        };
        fs::create_dir_all(base)
            .map_err(|source| SinkError::CreateDir { path: base.clone(), source })?;
        let path = base.join(sink_file_name(tid));
        let out = File::create(&path).map_err(|source| SinkError::Create { path, source })?;
        Ok(Self { tid, out })
    }

    /// Thread id this sink is keyed by.
    pub fn thread_id(&self) -> ThreadId {
        self.tid
    }

    /// Writes `<indent><signature> : (<callerLocation>)`.
    pub fn log_method_start(&self, sig: &MethodSig, caller: &SourceLocation) {
        self.write_event(&TraceEvent::MethodStart { sig: sig.clone(), caller: caller.clone() });
    }

    /// Writes `<indent><signature> : <nanos>`.
    pub fn log_method_duration(&self, sig: &MethodSig, nanos: u64) {
        self.write_event(&TraceEvent::MethodDuration { sig: sig.clone(), nanos });
    }

    /// Writes the two thread-start lines. The probe fires inside the
    /// spawning method's body, where the depth counter is already one past
    /// the method's own start line, so these land one level deeper.
    pub fn log_thread_start(&self, new_thread: ThreadId, caller: &SourceLocation) {
        self.write_event(&TraceEvent::ThreadStart { new_thread, caller: caller.clone() });
    }

    fn write_event(&self, event: &TraceEvent) {
        let rendered = format_event(event, context::depth());
        // Only the owning thread writes here; creation failures were fatal,
        // so a failed write is reported and the program keeps running.
        if let Err(err) = (&self.out).write_all(rendered.as_bytes()) {
            log::error!("trace write failed on thread {}: {err}", self.tid);
        }
    }
}

fn fatal(err: &dyn std::error::Error) -> ! {
    eprintln!("error: {err}");
    std::process::exit(EXIT_TRACING_FATAL);
}
