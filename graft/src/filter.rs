//! Scope filtering for unit names.
//!
//! A unit is instrumented only if it matches a caller-supplied package
//! prefix and belongs to neither the tracer's own namespace nor the
//! platform's core runtime namespace. Pure functions, safe to call
//! concurrently for different units.

/// Namespace of the instrumentation framework itself. Instrumenting our own
/// units would recurse through the probes.
pub const FRAMEWORK_NAMESPACE: &str = "graft";

/// Namespace of the platform's core runtime.
pub const PLATFORM_NAMESPACE: &str = "lang";

/// Returns true iff `unit_name` should be instrumented under `filters`.
///
/// Filters are tested in the supplied order and the first match wins; the
/// order does not change the result. A prefix matches only whole package
/// segments: `com.example` matches `com.example.Foo` but not
/// `com.examples.Foo` and not `com.example` itself.
pub fn in_scope(unit_name: &str, filters: &[String]) -> bool {
    if belongs_to(unit_name, PLATFORM_NAMESPACE) || belongs_to(unit_name, FRAMEWORK_NAMESPACE) {
        return false;
    }
    filters.iter().any(|prefix| belongs_to(unit_name, prefix))
}

/// Whole-segment prefix match: `name` starts with `prefix` + `.`.
fn belongs_to(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.'))
}
