//! Retry constants and backoff calculation.
//!
//! The portable, sync-only building blocks of the HTTP retry policy. The
//! actual async retry loop lives in `librarium-http` (which has access to
//! tokio); this module owns the numbers and the math so they can be tested
//! without a runtime.

/// Maximum retry attempts after the first request.
pub const MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds.
pub const INITIAL_RETRY_DELAY_MS: u64 = 1000;

/// Calculate the delay before a retry attempt.
///
/// `attempt` is 1-based: the delay before attempt `n` is
/// `INITIAL_RETRY_DELAY_MS × 2^(n−1)`.
#[must_use]
pub fn backoff_delay_ms(attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(31);
    INITIAL_RETRY_DELAY_MS.saturating_mul(1u64 << exponent)
}

/// Whether an HTTP status code warrants a retry.
///
/// Retryable: all 5xx and 429. Other 4xx are returned verbatim.
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
