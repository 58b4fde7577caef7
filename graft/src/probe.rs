//! The injected probe logic.
//!
//! A rewritten method opens a [`MethodSpan`] as its first operation. The
//! span is scoped acquisition: MethodStart fires on entry, and the matching
//! MethodDuration fires from `Drop` - so it fires on every exit path,
//! normal return and unwinding failure alike, never only on the happy path.

use crate::context;
use crate::domain::{MethodSig, SourceLocation, ThreadId};
use crate::logger::ProfileLogger;
use std::time::Instant;

/// RAII span covering one invocation of a traced method.
#[derive(Debug)]
pub struct MethodSpan {
    sig: MethodSig,
    entered: Instant,
}

impl MethodSpan {
    /// Emits MethodStart with the caller recorded in the thread context,
    /// then opens one nesting level and starts the timer.
    pub fn enter(sig: MethodSig) -> Self {
        let caller = context::current_call_site();
        ProfileLogger::instance().log_method_start(&sig, &caller);
        let entered = Instant::now();
        context::push_depth();
        Self { sig, entered }
    }
}

impl Drop for MethodSpan {
    fn drop(&mut self) {
        // Close the nesting level first so the duration line shares the
        // start line's indentation.
        context::pop_depth();
        let nanos = u64::try_from(self.entered.elapsed().as_nanos()).unwrap_or(u64::MAX);
        ProfileLogger::instance().log_method_duration(&self.sig, nanos);
    }
}

/// Thread-start probe: fires before the intercepted spawn proceeds,
/// carrying the id reserved for the thread about to exist.
pub fn thread_start(new_thread: ThreadId, caller: &SourceLocation) {
    ProfileLogger::instance().log_thread_start(new_thread, caller);
}
