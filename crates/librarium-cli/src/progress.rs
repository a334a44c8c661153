//! Plain-text progress rendering on stderr.
//!
//! No spinners, no color: one line per event, safe to interleave with
//! tracing output and to pipe.

use librarium_runtime::{ProgressEvent, ProgressSink};

/// Sink that prints each event as one stderr line.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { provider } => {
                eprintln!("[start]    {provider}");
            }
            ProgressEvent::Completed {
                provider,
                status,
                duration_ms,
            } => {
                eprintln!(
                    "[{status}] {provider} ({:.1}s)",
                    duration_ms as f64 / 1000.0
                );
            }
            ProgressEvent::Error { provider, message } => {
                eprintln!("[error]    {provider}: {message}");
            }
            ProgressEvent::AsyncSubmitted { provider, task_id } => {
                eprintln!("[async]    {provider} submitted task {task_id}");
            }
            ProgressEvent::FallbackStarted { provider, fallback } => {
                eprintln!("[fallback] {provider} -> {fallback}");
            }
        }
    }
}
