//! Per-thread tracing context.
//!
//! Three pieces of thread-local state feed the probes:
//! - the thread's logical id, minted lazily from a process-wide counter
//! - the nesting depth counter, pushed/popped by method spans
//! - the caller-location stack, pushed/popped around calls by the harness
//!
//! Depth is an explicit counter maintained by the probes rather than a
//! native stack walk; the outermost traced frame sits at depth zero by
//! construction.

use crate::domain::{SourceLocation, ThreadId};
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide id source. Ids start at 1; 0 is never assigned.
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TID: Cell<Option<ThreadId>> = const { Cell::new(None) };
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static CALL_SITES: RefCell<Vec<SourceLocation>> = const { RefCell::new(Vec::new()) };
}

/// Mints an id for a thread that does not exist yet, so a ThreadStart event
/// can name the child before the spawn proceeds.
pub fn reserve_thread_id() -> ThreadId {
    ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
}

/// The calling thread's logical id, assigned on first use.
pub fn current_thread_id() -> ThreadId {
    TID.with(|tid| match tid.get() {
        Some(id) => id,
        None => {
            let id = reserve_thread_id();
            tid.set(Some(id));
            id
        }
    })
}

/// Installs a pre-reserved id in a newly spawned thread. Must run before
/// anything else touches the context on that thread; once an id is
/// assigned it is kept, since sinks are keyed by it.
pub fn adopt_thread_id(id: ThreadId) {
    TID.with(|tid| {
        if tid.get().is_none() {
            tid.set(Some(id));
        }
    });
}

/// Current nesting depth of the calling thread.
pub fn depth() -> usize {
    DEPTH.with(Cell::get)
}

/// Opens one nesting level. Called by a method span on entry.
pub(crate) fn push_depth() {
    DEPTH.with(|depth| depth.set(depth.get() + 1));
}

/// Closes one nesting level. Called by a method span on exit.
pub(crate) fn pop_depth() {
    DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
}

/// Records the call site about to be entered.
pub(crate) fn push_call_site(site: SourceLocation) {
    CALL_SITES.with(|sites| sites.borrow_mut().push(site));
}

pub(crate) fn pop_call_site() {
    CALL_SITES.with(|sites| {
        sites.borrow_mut().pop();
    });
}

/// The innermost recorded call site, or the `unknown : 0` sentinel when the
/// calling thread entered the traced world without one (program entry, new
/// thread).
pub fn current_call_site() -> SourceLocation {
    CALL_SITES.with(|sites| sites.borrow().last().cloned().unwrap_or(SourceLocation::Unknown))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_push_pop() {
        let base = depth();
        push_depth();
        push_depth();
        assert_eq!(depth(), base + 2);
        pop_depth();
        assert_eq!(depth(), base + 1);
        pop_depth();
        assert_eq!(depth(), base);
    }

    #[test]
    fn test_pop_below_zero_saturates() {
        assert_eq!(depth(), 0);
        pop_depth();
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_same_thread_keeps_its_id() {
        assert_eq!(current_thread_id(), current_thread_id());
    }

    #[test]
    fn test_distinct_threads_get_distinct_ids() {
        let mine = current_thread_id();
        let other = std::thread::spawn(current_thread_id).join().expect("join");
        assert_ne!(mine, other);
    }

    #[test]
    fn test_adopt_only_before_first_use() {
        std::thread::spawn(|| {
            let reserved = reserve_thread_id();
            adopt_thread_id(reserved);
            assert_eq!(current_thread_id(), reserved);
            // A second adopt is ignored: the sink is already keyed.
            adopt_thread_id(ThreadId(999_999));
            assert_eq!(current_thread_id(), reserved);
        })
        .join()
        .expect("join");
    }

    #[test]
    fn test_call_site_stack() {
        std::thread::spawn(|| {
            assert_eq!(current_call_site(), SourceLocation::Unknown);
            push_call_site(SourceLocation::known("Foo.unit", 3));
            push_call_site(SourceLocation::known("Bar.unit", 7));
            assert_eq!(current_call_site(), SourceLocation::known("Bar.unit", 7));
            pop_call_site();
            assert_eq!(current_call_site(), SourceLocation::known("Foo.unit", 3));
            pop_call_site();
            assert_eq!(current_call_site(), SourceLocation::Unknown);
        })
        .join()
        .expect("join");
    }
}
