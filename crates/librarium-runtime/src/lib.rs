//! # librarium-runtime
//!
//! The run engine: bounded-parallel fan-out across providers, durable
//! async task handles, and the on-disk run record.
//!
//! - [`dispatcher`] — one query → many providers, sync/async routing,
//!   single-level fallback, progress events, exit-code accounting
//! - [`tasks`] — per-directory handle store (`async-tasks.json`, atomic
//!   writes) and the poll/retrieve loop behind `status --wait`
//! - [`artifacts`] — the run directory layout: `prompt.md`,
//!   `sources.json`, per-provider files, `summary.md`, `run.json`
//! - [`progress`] — the non-blocking event sink the CLI renders from
//!
//! The dispatcher never fails out of a run: every provider outcome
//! becomes a report, and only surrounding I/O errors propagate.

#![deny(unsafe_code)]

pub mod artifacts;
pub mod dispatcher;
pub mod errors;
pub mod progress;
pub mod tasks;

pub use dispatcher::{DispatchOutcome, DispatchParams, compute_exit_code, dispatch};
pub use errors::RuntimeError;
pub use progress::{NullSink, ProgressEvent, ProgressSink};
pub use tasks::TaskStore;
