//! Host-side execution harness.
//!
//! Stands in for the host runtime this tracer attaches to: it routes unit
//! bytes through the loader-hook port exactly once per load event, keeps
//! the resulting units in a table, and interprets method bodies so the
//! injected probes actually fire - calls push caller locations, probe
//! opcodes drive the probe layer, spawn opcodes create real OS threads.
//!
//! Probes run inline on the invoking thread; there is no scheduler and no
//! background worker. A failure raised by a body propagates out of
//! `invoke` as `ExecError`, unwinding through any open method span so its
//! duration event still fires.

use crate::context;
use crate::domain::{ExecError, MethodSig, SourceLocation, ThreadId};
use crate::engine::LoaderHook;
use crate::probe::{self, MethodSpan};
use graft_common::{DecodeError, Op, Unit};
use log::warn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::thread::JoinHandle;

/// Execution harness over loaded (possibly rewritten) units.
pub struct Runtime {
    hook: Box<dyn LoaderHook>,
    units: RwLock<HashMap<String, Unit>>,
    spawned: Mutex<Vec<JoinHandle<()>>>,
    // Handed to spawned threads so they can invoke their entry method.
    me: Weak<Runtime>,
}

impl Runtime {
    pub fn new(hook: impl LoaderHook + 'static) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            hook: Box::new(hook),
            units: RwLock::new(HashMap::new()),
            spawned: Mutex::new(Vec::new()),
            me: me.clone(),
        })
    }

    /// Loads a unit: one load event, one `on_load` call through the port.
    /// `None` from the port means the original bytes are used unchanged.
    pub fn load(&self, unit_name: &str, bytes: &[u8]) -> Result<(), DecodeError> {
        let unit = match self.hook.on_load(unit_name, bytes) {
            Some(rewritten) => Unit::decode(&rewritten)?,
            None => Unit::decode(bytes)?,
        };
        self.units
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(unit_name.to_string(), unit);
        Ok(())
    }

    /// Executes `unit.method()` by fully qualified name on the calling
    /// thread, returning once the whole call tree below it has run.
    pub fn invoke(&self, qualified: &str) -> Result<(), ExecError> {
        let (unit_name, sig) = split_qualified(qualified)
            .ok_or_else(|| ExecError::UnknownMethod(qualified.to_string()))?;

        let (source_file, ops) = {
            let units = self.units.read().unwrap_or_else(PoisonError::into_inner);
            let unit = units
                .get(unit_name)
                .ok_or_else(|| ExecError::UnknownUnit(unit_name.to_string()))?;
            let method = unit
                .methods
                .iter()
                .find(|m| m.sig == sig)
                .ok_or_else(|| ExecError::UnknownMethod(qualified.to_string()))?;
            if !method.is_concrete() {
                return Err(ExecError::NotConcrete(qualified.to_string()));
            }
            let ops = method
                .ops()
                .map_err(|source| ExecError::BadBody { sig: qualified.to_string(), source })?;
            (unit.source_file.clone(), ops)
        };

        self.exec_frame(qualified, &source_file, &ops)
    }

    /// Waits for every thread spawned by interpreted code so far.
    pub fn join_spawned(&self) {
        loop {
            let handle = self.spawned.lock().unwrap_or_else(PoisonError::into_inner).pop();
            match handle {
                Some(handle) => {
                    if handle.join().is_err() {
                        warn!("spawned thread panicked");
                    }
                }
                None => break,
            }
        }
    }

    /// Interprets one method frame. The method span opened by `ProbeEnter`
    /// lives until this frame returns - normally or through `?` - which is
    /// what guarantees the duration event on every exit path.
    fn exec_frame(
        &self,
        qualified: &str,
        source_file: &str,
        ops: &[Op],
    ) -> Result<(), ExecError> {
        let mut span: Option<MethodSpan> = None;
        for op in ops {
            match op {
                Op::ProbeEnter { sig } => {
                    span = Some(MethodSpan::enter(MethodSig::new(sig.as_str())));
                }
                Op::Call { target, line } => {
                    context::push_call_site(SourceLocation::known(source_file, *line));
                    let result = self.invoke(target);
                    context::pop_call_site();
                    result?;
                }
                Op::Spawn { target, .. } => {
                    self.spawn_entry(target, None);
                }
                Op::ProbeSpawn { target, line } => {
                    let child = context::reserve_thread_id();
                    probe::thread_start(child, &SourceLocation::known(source_file, *line));
                    self.spawn_entry(target, Some(child));
                }
                Op::Work { amount } => busy_work(*amount),
                Op::Fail { message } => {
                    return Err(ExecError::Failure {
                        sig: qualified.to_string(),
                        message: message.clone(),
                    });
                }
                Op::Ret => break,
            }
        }
        drop(span);
        Ok(())
    }

    /// The platform's thread-spawn primitive: run `entry` on a new OS
    /// thread. A reserved id, if any, becomes the child's logical id.
    fn spawn_entry(&self, entry: &str, reserved: Option<ThreadId>) {
        let Some(runtime) = self.me.upgrade() else {
            // Runtime is being dropped; nothing left to run on.
            return;
        };
        let entry = entry.to_string();
        let handle = std::thread::spawn(move || {
            if let Some(id) = reserved {
                context::adopt_thread_id(id);
            }
            if let Err(err) = runtime.invoke(&entry) {
                warn!("thread entry `{entry}` failed: {err}");
            }
        });
        self.spawned.lock().unwrap_or_else(PoisonError::into_inner).push(handle);
    }
}

/// Splits `com.example.Foo.bar()` into `(com.example.Foo, bar())`.
/// Method signatures themselves never contain dots.
fn split_qualified(qualified: &str) -> Option<(&str, &str)> {
    let dot = qualified.rfind('.')?;
    if dot == 0 || dot + 1 == qualified.len() {
        return None;
    }
    Some((&qualified[..dot], &qualified[dot + 1..]))
}

/// Deterministic busy work standing in for application logic.
fn busy_work(amount: u32) {
    let mut acc = 0u64;
    for i in 0..u64::from(amount) * 100 {
        acc = acc.wrapping_add(std::hint::black_box(i));
    }
    std::hint::black_box(acc);
}
