//! # graft - load-time call-tracing instrumentation
//!
//! graft rewrites code units as the host loads them, injecting tracing
//! probes into every eligible method so that running the program produces a
//! per-thread, nested, timestamped call log - no source changes, no
//! recompilation step.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Host / Loader                         │
//! │        hands (unit name, unit bytes) to the core            │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ on_load (Loader Hook port)
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    graft (This Crate)                       │
//! │                                                             │
//! │  ┌──────────┐    ┌───────────────┐    ┌─────────────────┐   │
//! │  │  Filter  │───▶│ Instrumenta-  │───▶│ rewritten unit  │   │
//! │  │ Evaluator│    │  tion Engine  │    │  back to host   │   │
//! │  └──────────┘    └───────────────┘    └─────────────────┘   │
//! │                                                             │
//! │        at execution time, injected probes fire:             │
//! │                                                             │
//! │  ┌──────────┐    ┌───────────────┐    ┌─────────────────┐   │
//! │  │  Probes  │───▶│   Profiling   │───▶│ thread_<id>.txt │   │
//! │  │ (spans)  │    │    Logger     │    │   trace files   │   │
//! │  └──────────┘    └───────────────┘    └─────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`filter`]: decides whether a unit name is in scope for instrumentation
//! - [`engine`]: the loader-hook port and the unit transformer that injects
//!   entry probes and intercepts thread spawns
//! - [`probe`]: the injected logic itself - an RAII method span whose drop
//!   fires the duration event on every exit path, and the thread-start probe
//! - [`context`]: per-thread tracing state - logical thread id, nesting
//!   depth, caller-location stack
//! - [`logger`]: thread-keyed registry of append-only trace sinks and the
//!   trace line format
//! - [`runtime`]: host-side execution harness that loads units through the
//!   port and interprets their bodies, so probes actually fire
//! - [`domain`]: core domain types and errors
//! - [`config`]: the configuration surface handed over by the bootstrap
//!
//! ## Key Concepts
//!
//! - **Code unit**: one independently loadable piece of executable logic,
//!   encoded in the `graft-common` wire format
//! - **Probe**: injected logging logic at a defined point in a method
//! - **Sink**: an append-only trace file owned by exactly one thread
//! - **Loader Hook**: the port through which the host hands units to the
//!   core at load time; the core is always callee, never caller

pub mod config;
pub mod context;
pub mod domain;
pub mod engine;
pub mod filter;
pub mod logger;
pub mod probe;
pub mod runtime;
