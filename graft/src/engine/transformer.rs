//! Rewrites eligible methods of in-scope units to carry tracing probes.
//!
//! For every traceable method the transformer injects a `ProbeEnter`
//! prologue (entry timestamp + MethodStart, duration on every exit path via
//! the span it opens) and replaces each direct use of the platform's
//! thread-spawn primitive with its traced counterpart. Everything else in
//! the body is preserved, as are the method's signature and failure
//! semantics.
//!
//! Failure containment is per method: a body that cannot be rewritten is
//! kept as-is, reported on the error channel, and the rest of the unit is
//! still processed.

use crate::config::TraceConfig;
use crate::domain::TransformError;
use crate::filter;
use graft_common::{encode_ops, Method, Op, Unit, UNIT_FLAG_INSTRUMENTED};
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Port through which the host hands units to the core at load time.
///
/// `None` means the unit is returned byte-for-byte unchanged. The core is
/// always callee of this port, never caller; the host invokes it exactly
/// once per load event.
pub trait LoaderHook: Send + Sync {
    fn on_load(&self, unit_name: &str, bytes: &[u8]) -> Option<Vec<u8>>;
}

/// The instrumentation engine.
///
/// Holds the read-only filter configuration and the set of unit names
/// already rewritten in this load cycle; safe to share across concurrent
/// load events.
pub struct Transformer {
    filters: Vec<String>,
    rewritten: Mutex<HashSet<String>>,
}

impl Transformer {
    pub fn new(filters: Vec<String>) -> Self {
        Self { filters, rewritten: Mutex::new(HashSet::new()) }
    }

    /// Engine configured from the bootstrap-supplied surface.
    pub fn from_config(config: &TraceConfig) -> Self {
        Self::new(config.filters.clone())
    }

    /// Injects probes into every traceable method of `unit`, marking the
    /// unit as instrumented. Returns how many methods were rewritten.
    fn instrument_unit(&self, unit: &mut Unit) -> usize {
        let unit_name = unit.name.clone();
        let mut probed = 0;
        for method in &mut unit.methods {
            if !method.is_concrete() {
                continue;
            }
            let qualified = format!("{unit_name}.{}", method.sig);
            match instrument_method(method, &qualified) {
                Ok(()) => probed += 1,
                Err(err) => warn!("skipping `{qualified}`: {err}"),
            }
        }
        unit.flags |= UNIT_FLAG_INSTRUMENTED;
        probed
    }

    fn mark_rewritten(&self, unit_name: &str) -> bool {
        self.rewritten
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(unit_name.to_string())
    }

    fn unmark_rewritten(&self, unit_name: &str) {
        self.rewritten.lock().unwrap_or_else(PoisonError::into_inner).remove(unit_name);
    }
}

impl LoaderHook for Transformer {
    fn on_load(&self, unit_name: &str, bytes: &[u8]) -> Option<Vec<u8>> {
        if !filter::in_scope(unit_name, &self.filters) {
            return None;
        }

        // Reserve the name before decoding so a concurrent load event for
        // the same unit cannot rewrite it twice.
        if !self.mark_rewritten(unit_name) {
            debug!("`{unit_name}` already rewritten in this load cycle");
            return None;
        }

        let mut unit = match Unit::decode(bytes) {
            Ok(unit) => unit,
            Err(err) => {
                // Nothing was rewritten; a later load event may retry.
                self.unmark_rewritten(unit_name);
                warn!("cannot decode `{unit_name}`: {err}");
                return None;
            }
        };

        if unit.is_instrumented() {
            debug!("`{unit_name}` already carries probes");
            return None;
        }

        let probed = self.instrument_unit(&mut unit);
        debug!("instrumented {probed} methods in `{unit_name}`");
        Some(unit.encode())
    }
}

/// Rewrites one method body: entry-probe prologue, traced thread spawns.
fn instrument_method(method: &mut Method, qualified: &str) -> Result<(), TransformError> {
    let ops = method
        .ops()
        .map_err(|source| TransformError::MalformedBody { sig: qualified.to_string(), source })?;

    // Validate probe-relevant references before touching the body.
    for op in &ops {
        if let Op::Call { target, .. } | Op::Spawn { target, .. } = op {
            if target.is_empty() {
                return Err(TransformError::UnresolvedReference {
                    sig: qualified.to_string(),
                    reference: target.clone(),
                });
            }
        }
    }

    let mut rewritten = Vec::with_capacity(ops.len() + 1);
    rewritten.push(Op::ProbeEnter { sig: qualified.to_string() });
    for op in ops {
        match op {
            Op::Spawn { target, line } => rewritten.push(Op::ProbeSpawn { target, line }),
            other => rewritten.push(other),
        }
    }
    method.body = encode_ops(&rewritten);
    Ok(())
}
