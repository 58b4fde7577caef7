//! End-to-end trace output: build units, load them through the loader-hook
//! port, execute them on the harness, and check the per-thread trace files.
//!
//! All tests share one process-wide output directory (the logger registry
//! is process-wide state by design); isolation comes from each test running
//! on its own thread and therefore owning its own sink.

use graft::context;
use graft::domain::{ExecError, ThreadId};
use graft::engine::{LoaderHook, Transformer};
use graft::logger::{self, ProfileLogger};
use graft::runtime::Runtime;
use graft_common::UnitBuilder;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

fn init_tracing() -> &'static Path {
    static DIR: OnceLock<TempDir> = OnceLock::new();
    let dir = DIR.get_or_init(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        TempDir::new().expect("create temp dir")
    });
    logger::init(dir.path()).expect("logger init");
    dir.path()
}

fn runtime(filters: &[&str]) -> Arc<Runtime> {
    Runtime::new(Transformer::new(filters.iter().map(|f| (*f).to_string()).collect()))
}

fn own_sink_lines() -> Vec<String> {
    let path = logger::sink_path(context::current_thread_id()).expect("initialized");
    let content = std::fs::read_to_string(path).expect("own sink exists");
    content.lines().map(str::to_string).collect()
}

fn tabs(line: &str) -> usize {
    line.bytes().take_while(|b| *b == b'\t').count()
}

/// A traced method that spawns a thread announces the child before the
/// spawn proceeds, then reports its own duration last.
#[test]
fn test_method_with_thread_spawn_scenario() {
    init_tracing();
    let rt = runtime(&["com.example"]);

    let unit = UnitBuilder::new("com.example.Foo")
        .method("bar()", |m| m.work(5).spawn("com.example.Foo.worker()").work(3))
        .method("worker()", |m| m.work(2))
        .build();
    rt.load("com.example.Foo", &unit.encode()).expect("load");
    rt.invoke("com.example.Foo.bar()").expect("invoke");
    rt.join_spawned();

    let lines = own_sink_lines();
    assert_eq!(lines.len(), 4, "unexpected trace: {lines:?}");
    assert_eq!(lines[0], "com.example.Foo.bar() : (unknown : 0)");
    assert_eq!(lines[1], "\tThread.start() : (Foo.unit : 2)");

    let child_tid = lines[2]
        .strip_prefix("\tThread.start() : ")
        .expect("thread-start id line")
        .parse::<u64>()
        .expect("numeric child id");

    // Duration parses as u64, hence non-negative within timer resolution.
    lines[3]
        .strip_prefix("com.example.Foo.bar() : ")
        .expect("duration line")
        .parse::<u64>()
        .expect("numeric duration");

    // The child thread wrote its own sink, keyed by the announced id.
    let child_path = logger::sink_path(ThreadId(child_tid)).expect("initialized");
    let child = std::fs::read_to_string(child_path).expect("child sink exists");
    let child_lines: Vec<&str> = child.lines().collect();
    assert_eq!(child_lines.len(), 2);
    assert_eq!(child_lines[0], "com.example.Foo.worker() : (unknown : 0)");
    assert!(child_lines[1].starts_with("com.example.Foo.worker() : "));
}

/// Nesting depth: every callee is exactly one tab deeper than its caller,
/// and each duration line matches its own start line's indentation.
#[test]
fn test_nested_call_indentation_and_ordering() {
    init_tracing();
    let rt = runtime(&["com.example"]);

    let unit = UnitBuilder::new("com.example.Nest")
        .method("a()", |m| m.work(1).call("com.example.Nest.b()"))
        .method("b()", |m| m.work(1).call("com.example.Nest.c()"))
        .method("c()", |m| m.work(1))
        .build();
    rt.load("com.example.Nest", &unit.encode()).expect("load");
    rt.invoke("com.example.Nest.a()").expect("invoke");

    let lines = own_sink_lines();
    assert_eq!(lines.len(), 6, "unexpected trace: {lines:?}");

    // Temporal order: outer start, inner start/duration pairs, outer duration.
    assert!(lines[0].contains("Nest.a() : (unknown : 0)"));
    assert!(lines[1].contains("Nest.b() : (Nest.unit : 2)"));
    assert!(lines[2].contains("Nest.c() : (Nest.unit : 2)"));
    assert!(lines[3].contains("Nest.c() : "));
    assert!(lines[4].contains("Nest.b() : "));
    assert!(lines[5].contains("Nest.a() : "));

    // Indentation: strictly deeper going in, identical start/duration pairs.
    assert_eq!(tabs(&lines[0]), 0);
    assert_eq!(tabs(&lines[1]), 1);
    assert_eq!(tabs(&lines[2]), 2);
    assert_eq!(tabs(&lines[3]), tabs(&lines[2]));
    assert_eq!(tabs(&lines[4]), tabs(&lines[1]));
    assert_eq!(tabs(&lines[5]), tabs(&lines[0]));
}

/// A method that exits by failure still logs exactly one start and one
/// duration, as does every caller it unwinds through.
#[test]
fn test_failure_exit_path_still_logs_duration() {
    init_tracing();
    let rt = runtime(&["com.example"]);

    let unit = UnitBuilder::new("com.example.Boom")
        .method("f()", |m| m.call("com.example.Boom.g()"))
        .method("g()", |m| m.work(1).fail("boom"))
        .build();
    rt.load("com.example.Boom", &unit.encode()).expect("load");

    match rt.invoke("com.example.Boom.f()") {
        Err(ExecError::Failure { sig, message }) => {
            assert_eq!(sig, "com.example.Boom.g()");
            assert_eq!(message, "boom");
        }
        other => panic!("expected propagated failure, got {other:?}"),
    }

    let lines = own_sink_lines();
    assert_eq!(lines.len(), 4, "unexpected trace: {lines:?}");
    assert_eq!(lines[0], "com.example.Boom.f() : (unknown : 0)");
    assert_eq!(lines[1], "\tcom.example.Boom.g() : (Boom.unit : 1)");
    lines[2]
        .strip_prefix("\tcom.example.Boom.g() : ")
        .expect("duration line for g")
        .parse::<u64>()
        .expect("numeric duration");
    lines[3]
        .strip_prefix("com.example.Boom.f() : ")
        .expect("duration line for f")
        .parse::<u64>()
        .expect("numeric duration");

    let starts = lines.iter().filter(|l| l.contains("Boom.g() : (")).count();
    assert_eq!(starts, 1);
}

/// An out-of-scope unit runs without probes and leaves no trace anywhere.
#[test]
fn test_out_of_scope_unit_traces_nothing() {
    let dir = init_tracing();
    let transformer = Transformer::new(vec!["com.example".to_string()]);

    let unit = UnitBuilder::new("org.other.Baz").method("quux()", |m| m.work(4)).build();
    let bytes = unit.encode();
    assert!(transformer.on_load("org.other.Baz", &bytes).is_none());

    let rt = Runtime::new(transformer);
    rt.load("org.other.Baz", &bytes).expect("load");
    rt.invoke("org.other.Baz.quux()").expect("invoke");

    // This thread never triggered a probe, so it owns no sink at all.
    let own = logger::sink_path(context::current_thread_id()).expect("initialized");
    assert!(!own.exists());

    // And no sink of any thread mentions the unit.
    for entry in std::fs::read_dir(dir).expect("read out dir") {
        let path = entry.expect("dir entry").path();
        let content = std::fs::read_to_string(&path).expect("read sink");
        assert!(!content.contains("org.other.Baz"), "stray trace in {path:?}");
    }
}

/// One sink per thread: repeated lookups return the identical sink,
/// distinct threads get distinct sinks under distinct ids.
#[test]
fn test_sink_identity_per_thread() {
    init_tracing();

    let first = ProfileLogger::instance();
    let second = ProfileLogger::instance();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.thread_id(), context::current_thread_id());

    let mine = first.thread_id();
    let other = std::thread::spawn(|| ProfileLogger::instance().thread_id())
        .join()
        .expect("join");
    assert_ne!(mine, other);
    assert_ne!(logger::sink_file_name(mine), logger::sink_file_name(other));
}
