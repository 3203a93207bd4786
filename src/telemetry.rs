//! Telemetry metric name constants.
//!
//! Centralised metric names for heimdallr operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `heimdallr_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider` — provider name the admission gate tracks
//! - `operation` — logical batch operation name
//! - `status` — outcome: "ok" or "error"
//! - `kind` — cache lookup kind: "exact", "similar", or "keyed"

/// Total calls admitted through the gate.
///
/// Labels: `provider`.
pub const ADMITTED_TOTAL: &str = "heimdallr_admitted_calls_total";

/// Time spent waiting for an admission slot, in seconds.
///
/// Labels: `provider`.
pub const ADMISSION_WAIT_SECONDS: &str = "heimdallr_admission_wait_seconds";

/// Total admission waits that exceeded the caller's maximum.
///
/// Labels: `provider`.
pub const ADMISSION_TIMEOUTS_TOTAL: &str = "heimdallr_admission_timeouts_total";

/// Total batch flushes.
///
/// Labels: `operation`, `status` ("ok" | "error").
pub const FLUSHES_TOTAL: &str = "heimdallr_flushes_total";

/// Flush duration in seconds (processor call included).
///
/// Labels: `operation`.
pub const FLUSH_DURATION_SECONDS: &str = "heimdallr_flush_duration_seconds";

/// Total items settled, split by delivery mode.
///
/// Labels: `operation`, `mode` ("batched" | "single").
pub const BATCH_ITEMS_TOTAL: &str = "heimdallr_batch_items_total";

/// Total cache hits.
///
/// Labels: `kind` ("exact" | "similar" | "keyed").
pub const CACHE_HITS_TOTAL: &str = "heimdallr_cache_hits_total";

/// Total cache misses.
///
/// Labels: `kind` ("fingerprint" | "keyed").
pub const CACHE_MISSES_TOTAL: &str = "heimdallr_cache_misses_total";

/// Total fingerprint index evictions (FIFO bound).
pub const EVICTIONS_TOTAL: &str = "heimdallr_evictions_total";
