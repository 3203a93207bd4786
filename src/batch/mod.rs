//! Opportunistic batching of near-simultaneous single-item calls.
//!
//! [`BatchAggregator`] accumulates items submitted to the same logical
//! operation name and dispatches them to the caller-supplied
//! [`BatchProcessor`] as one physical call, bounded by size and time.
//! Each caller gets back exactly its own result; a flush of one is
//! forwarded directly, bypassing batch overhead.
//!
//! # Flush triggers
//!
//! A pending batch flushes when the first of these fires:
//!
//! 1. size — the queue reaches the (adaptive) max batch size;
//! 2. window timer — the batch-collection window elapses;
//! 3. failsafe timer — a longer guard that forces a flush even if the
//!    window timer was somehow lost or starved.
//!
//! Timer triggers carry the epoch they were armed under; a flush bumps
//! the epoch when it captures the queue, so a stale timer racing a
//! size-triggered flush can never double-flush the same batch. Items
//! arriving after a flush captures its queue always start the next
//! batch, never join the current one.
//!
//! # Memory pressure
//!
//! When a resident-memory threshold is configured, a periodic sampler
//! halves the effective max batch size above the threshold and restores
//! it after a cooldown. Sampling failures are logged and ignored.

mod memory;
mod processor;
mod stats;
mod timer;

pub use memory::{MemorySampler, ProcSelfSampler};
pub use processor::{BatchInput, BatchOutput, BatchProcessor, FlushOptions};
pub use stats::BatchStats;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::telemetry;
use crate::{HeimdallrError, Result};

use stats::StatsState;
use timer::DelayedTask;

/// Configuration for the batch aggregator.
///
/// ```rust
/// # use heimdallr::BatchConfig;
/// # use std::time::Duration;
/// let config = BatchConfig::new()
///     .max_batch_size(20)
///     .window(Duration::from_millis(50))
///     .memory_threshold_bytes(512 * 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Queue length that triggers an immediate flush. Default: 10.
    pub max_batch_size: usize,
    /// Batch-collection window. Default: 100ms.
    pub window: Duration,
    /// Failsafe bound on how long a batch may sit queued. Default: 2s.
    pub failsafe_window: Duration,
    /// Delay before re-flushing items that accumulated during a flush,
    /// avoiding tight re-entrant loops. Default: 25ms.
    pub reflush_delay: Duration,
    /// Resident-memory threshold above which the max batch size is
    /// temporarily halved. Default: off.
    pub memory_threshold_bytes: Option<u64>,
    /// How often memory is sampled. Default: 30s.
    pub memory_check_interval: Duration,
    /// How long after the last over-threshold sample the original max
    /// batch size is restored. Default: 60s.
    pub memory_cooldown: Duration,
    /// Rolling-history length for average batch size / flush duration.
    /// Default: 100.
    pub stats_window: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            window: Duration::from_millis(100),
            failsafe_window: Duration::from_secs(2),
            reflush_delay: Duration::from_millis(25),
            memory_threshold_bytes: None,
            memory_check_interval: Duration::from_secs(30),
            memory_cooldown: Duration::from_secs(60),
            stats_window: 100,
        }
    }
}

impl BatchConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue length that triggers an immediate flush.
    pub fn max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = n.max(1);
        self
    }

    /// Set the batch-collection window.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set the failsafe bound on batch queueing time.
    pub fn failsafe_window(mut self, window: Duration) -> Self {
        self.failsafe_window = window;
        self
    }

    /// Set the post-flush re-flush delay.
    pub fn reflush_delay(mut self, delay: Duration) -> Self {
        self.reflush_delay = delay;
        self
    }

    /// Enable memory-pressure adaptation above this resident size.
    pub fn memory_threshold_bytes(mut self, bytes: u64) -> Self {
        self.memory_threshold_bytes = Some(bytes);
        self
    }

    /// Set the memory sampling interval.
    pub fn memory_check_interval(mut self, interval: Duration) -> Self {
        self.memory_check_interval = interval;
        self
    }

    /// Set the restore cooldown after memory pressure.
    pub fn memory_cooldown(mut self, cooldown: Duration) -> Self {
        self.memory_cooldown = cooldown;
        self
    }

    /// Set the rolling-history length for averages.
    pub fn stats_window(mut self, window: usize) -> Self {
        self.stats_window = window.max(1);
        self
    }
}

/// One queued item: payload, per-item options, its processor, and a
/// single-fire completion channel. The oneshot sender guarantees the
/// item settles at most once; flush bookkeeping guarantees at least once.
struct QueuedItem {
    id: u64,
    payload: Value,
    options: Value,
    processor: Arc<dyn BatchProcessor>,
    done: oneshot::Sender<Result<Value>>,
}

/// Mutable per-operation state. The queue captured by a flush is swapped
/// out atomically under the registry lock; `epoch` identifies which
/// incarnation of the queue a timer was armed for.
#[derive(Default)]
struct OpState {
    queue: Vec<QueuedItem>,
    window_timer: Option<DelayedTask>,
    failsafe_timer: Option<DelayedTask>,
    in_progress: bool,
    epoch: u64,
}

struct Registry {
    ops: HashMap<String, OpState>,
    shutdown: bool,
}

struct Inner {
    config: BatchConfig,
    registry: Mutex<Registry>,
    stats: Mutex<StatsState>,
    effective_max: AtomicUsize,
    next_id: AtomicU64,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

/// Accumulates concurrently-submitted single-item calls into batches.
///
/// Operation names are independent: items submitted under different
/// names never share a batch or contend on flush timing. Construct one
/// instance at startup and share it (the handle is cheap to clone).
#[derive(Clone)]
pub struct BatchAggregator {
    inner: Arc<Inner>,
}

impl BatchAggregator {
    /// Create an aggregator with the default Linux memory sampler.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context when a memory threshold is
    /// configured (the monitor task is spawned at construction).
    pub fn new(config: BatchConfig) -> Self {
        Self::with_sampler(config, Arc::new(ProcSelfSampler))
    }

    /// Create an aggregator with a custom memory sampler.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context when a memory threshold is
    /// configured (the monitor task is spawned at construction).
    pub fn with_sampler(config: BatchConfig, sampler: Arc<dyn MemorySampler>) -> Self {
        let inner = Arc::new(Inner {
            effective_max: AtomicUsize::new(config.max_batch_size),
            stats: Mutex::new(StatsState::new(config.stats_window)),
            registry: Mutex::new(Registry {
                ops: HashMap::new(),
                shutdown: false,
            }),
            next_id: AtomicU64::new(0),
            monitor: Mutex::new(None),
            config,
        });
        if inner.config.memory_threshold_bytes.is_some() {
            let handle = Inner::spawn_monitor(Arc::downgrade(&inner), sampler);
            *inner.monitor.lock().expect("monitor lock poisoned") = Some(handle);
        }
        Self { inner }
    }

    /// Queue `payload` for `operation` and await its individual result.
    ///
    /// The item either joins the current pending batch or starts a new
    /// one; its result arrives once the flush that captured it settles.
    /// All callers submitting to one operation name must supply
    /// interchangeable processors.
    pub async fn process(
        &self,
        operation: &str,
        payload: Value,
        processor: Arc<dyn BatchProcessor>,
        options: Value,
    ) -> Result<Value> {
        let (rx, flush_now) = {
            let mut reg = self.inner.registry.lock().expect("registry lock poisoned");
            if reg.shutdown {
                return Err(HeimdallrError::ShuttingDown);
            }
            let op = reg.ops.entry(operation.to_owned()).or_default();
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            op.queue.push(QueuedItem {
                id,
                payload,
                options,
                processor,
                done: tx,
            });
            debug!(operation, item_id = id, queued = op.queue.len(), "queued item");

            let max = self.inner.effective_max.load(Ordering::Relaxed).max(1);
            if op.queue.len() >= max {
                (rx, true)
            } else {
                if !timer_pending(&op.window_timer) {
                    op.window_timer = Some(Inner::flush_timer(
                        &self.inner,
                        operation,
                        self.inner.config.window,
                        op.epoch,
                    ));
                }
                if !timer_pending(&op.failsafe_timer) {
                    op.failsafe_timer = Some(Inner::flush_timer(
                        &self.inner,
                        operation,
                        self.inner.config.failsafe_window,
                        op.epoch,
                    ));
                }
                (rx, false)
            }
        };

        if flush_now {
            Inner::flush(&self.inner, operation, None).await;
        }

        rx.await.map_err(|_| HeimdallrError::CompletionLost)?
    }

    /// Flush every operation's pending batch immediately.
    pub async fn process_all(&self) {
        let pending: Vec<String> = {
            let reg = self.inner.registry.lock().expect("registry lock poisoned");
            reg.ops
                .iter()
                .filter(|(_, op)| !op.queue.is_empty())
                .map(|(name, _)| name.clone())
                .collect()
        };
        // Operations are independent; flush them concurrently.
        futures_util::future::join_all(
            pending
                .iter()
                .map(|operation| Inner::flush(&self.inner, operation, None)),
        )
        .await;
    }

    /// Stop accepting work and reject every queued item.
    ///
    /// Items already captured by an in-flight flush still settle from
    /// that flush's outcome; everything still queued fails with
    /// [`ShuttingDown`](HeimdallrError::ShuttingDown).
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .inner
            .monitor
            .lock()
            .expect("monitor lock poisoned")
            .take()
        {
            handle.abort();
        }
        let drained: Vec<QueuedItem> = {
            let mut reg = self.inner.registry.lock().expect("registry lock poisoned");
            reg.shutdown = true;
            reg.ops
                .drain()
                .flat_map(|(_, op)| op.queue)
                .collect()
        };
        for item in drained {
            let _ = item.done.send(Err(HeimdallrError::ShuttingDown));
        }
    }

    /// Point-in-time statistics snapshot.
    pub fn stats(&self) -> BatchStats {
        let pending = {
            let reg = self.inner.registry.lock().expect("registry lock poisoned");
            reg.ops.values().map(|op| op.queue.len()).sum()
        };
        self.inner
            .stats
            .lock()
            .expect("stats lock poisoned")
            .snapshot(pending, self.inner.effective_max.load(Ordering::Relaxed))
    }
}

/// Whether a timer slot holds a timer that can still fire.
fn timer_pending(slot: &Option<DelayedTask>) -> bool {
    slot.as_ref().is_some_and(|t| !t.is_finished())
}

/// Clears an operation's in-progress flag on drop, so a processor that
/// panics mid-flush cannot wedge the operation. The normal flush path
/// disarms it and resets the flag itself.
struct FlushGuard<'a> {
    inner: &'a Arc<Inner>,
    operation: &'a str,
    armed: bool,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut reg) = self.inner.registry.lock() {
            if let Some(op) = reg.ops.get_mut(self.operation) {
                op.in_progress = false;
            }
        }
    }
}

impl Inner {
    /// Arm a flush timer for `operation`. The timer holds a weak handle
    /// so an aggregator dropped before the timer fires is simply gone.
    fn flush_timer(inner: &Arc<Inner>, operation: &str, delay: Duration, epoch: u64) -> DelayedTask {
        let weak = Arc::downgrade(inner);
        let operation = operation.to_owned();
        DelayedTask::spawn(delay, async move {
            if let Some(inner) = weak.upgrade() {
                Inner::flush(&inner, &operation, Some(epoch)).await;
            }
        })
    }

    /// Flush the pending batch for `operation`.
    ///
    /// `armed_epoch` is `Some` for timer triggers: if the queue was
    /// already captured (and the epoch bumped) since the timer was
    /// armed, the trigger is stale and ignored.
    async fn flush(inner: &Arc<Inner>, operation: &str, armed_epoch: Option<u64>) {
        let items = {
            let mut reg = inner.registry.lock().expect("registry lock poisoned");
            let Some(op) = reg.ops.get_mut(operation) else {
                return;
            };
            if let Some(epoch) = armed_epoch {
                if op.epoch != epoch {
                    return;
                }
            }
            if op.queue.is_empty() {
                op.window_timer = None;
                op.failsafe_timer = None;
                return;
            }
            if op.in_progress {
                // A flush for this operation is mid-call; the queue holds
                // next-batch items. Re-check shortly instead of piling on.
                // The slot may hold the very timer that fired this trigger,
                // so replace it unconditionally.
                op.window_timer = Some(Self::flush_timer(
                    inner,
                    operation,
                    inner.config.reflush_delay,
                    op.epoch,
                ));
                return;
            }
            op.in_progress = true;
            op.epoch = op.epoch.wrapping_add(1);
            // Cancellation is cooperative, so dropping the slot that holds
            // the very timer driving this flush is safe.
            if let Some(t) = op.window_timer.take() {
                t.cancel();
            }
            if let Some(t) = op.failsafe_timer.take() {
                t.cancel();
            }
            std::mem::take(&mut op.queue)
        };
        let mut guard = FlushGuard {
            inner,
            operation,
            armed: true,
        };

        let size = items.len();
        let started = Instant::now();
        let failed = Self::dispatch(items).await;
        let duration = started.elapsed();

        let status = if failed { "error" } else { "ok" };
        metrics::counter!(telemetry::FLUSHES_TOTAL,
            "operation" => operation.to_owned(), "status" => status)
        .increment(1);
        metrics::histogram!(telemetry::FLUSH_DURATION_SECONDS,
            "operation" => operation.to_owned())
        .record(duration.as_secs_f64());
        let mode = if size > 1 { "batched" } else { "single" };
        metrics::counter!(telemetry::BATCH_ITEMS_TOTAL,
            "operation" => operation.to_owned(), "mode" => mode)
        .increment(size as u64);

        inner
            .stats
            .lock()
            .expect("stats lock poisoned")
            .record_flush(size, duration, failed);
        debug!(operation, size, failed, duration_ms = duration.as_millis() as u64, "flushed batch");

        let mut reg = inner.registry.lock().expect("registry lock poisoned");
        guard.armed = false;
        if let Some(op) = reg.ops.get_mut(operation) {
            op.in_progress = false;
            // Items that arrived during the flush belong to the next
            // batch; give them a flush of their own after a short delay.
            if !op.queue.is_empty() {
                if !timer_pending(&op.window_timer) {
                    op.window_timer = Some(Self::flush_timer(
                        inner,
                        operation,
                        inner.config.reflush_delay,
                        op.epoch,
                    ));
                }
                if !timer_pending(&op.failsafe_timer) {
                    op.failsafe_timer = Some(Self::flush_timer(
                        inner,
                        operation,
                        inner.config.failsafe_window,
                        op.epoch,
                    ));
                }
            }
        }
    }

    /// Run the processor for a captured flush and settle every item.
    ///
    /// Returns whether the flush failed.
    async fn dispatch(items: Vec<QueuedItem>) -> bool {
        if items.len() == 1 {
            let Some(item) = items.into_iter().next() else {
                return false;
            };
            let options = FlushOptions {
                batched: false,
                size: 1,
                item_options: vec![item.options.clone()],
            };
            let input = BatchInput::Single(item.payload.clone());
            match item.processor.clone().run(input, &options).await {
                Ok(BatchOutput::Single(value)) => {
                    let _ = item.done.send(Ok(value));
                    false
                }
                Ok(BatchOutput::Many(mut values)) if values.len() == 1 => {
                    let _ = item.done.send(Ok(values.remove(0)));
                    false
                }
                Ok(BatchOutput::Many(values)) => {
                    let _ = item.done.send(Err(HeimdallrError::ItemFailure(format!(
                        "expected a single result, got {} results",
                        values.len()
                    ))));
                    true
                }
                Err(e) => {
                    // Single-item failures carry the original error.
                    let _ = item.done.send(Err(e));
                    true
                }
            }
        } else {
            let payloads: Vec<Value> = items.iter().map(|i| i.payload.clone()).collect();
            let options = FlushOptions {
                batched: true,
                size: items.len(),
                item_options: items.iter().map(|i| i.options.clone()).collect(),
            };
            let processor = items[0].processor.clone();
            match processor.run(BatchInput::Many(payloads), &options).await {
                Ok(BatchOutput::Many(results)) if results.len() == items.len() => {
                    for (item, result) in items.into_iter().zip(results) {
                        let _ = item.done.send(Ok(result));
                    }
                    false
                }
                Ok(BatchOutput::Many(results)) => {
                    // Positional alignment is a contract requirement on the
                    // processor; fail the flush rather than misassign results.
                    let expected = items.len();
                    let actual = results.len();
                    warn!(expected, actual, "batch result length mismatch");
                    for item in items {
                        let _ = item.done.send(Err(HeimdallrError::BatchFailure(format!(
                            "result length mismatch: expected {expected}, got {actual}"
                        ))));
                    }
                    true
                }
                Ok(BatchOutput::Single(value)) => {
                    // Shared result for every item in the flush.
                    for item in items {
                        let _ = item.done.send(Ok(value.clone()));
                    }
                    false
                }
                Err(e) => {
                    let message = e.to_string();
                    for item in items {
                        let _ = item
                            .done
                            .send(Err(HeimdallrError::BatchFailure(message.clone())));
                    }
                    true
                }
            }
        }
    }

    fn spawn_monitor(weak: Weak<Inner>, sampler: Arc<dyn MemorySampler>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut restore_at: Option<Instant> = None;
            loop {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let threshold = match inner.config.memory_threshold_bytes {
                    Some(t) => t,
                    None => return,
                };
                let interval = inner.config.memory_check_interval;
                match sampler.resident_bytes() {
                    Some(rss) if rss > threshold => {
                        let current = inner.effective_max.load(Ordering::Relaxed);
                        let halved = (current / 2).max(1);
                        if halved < current {
                            warn!(
                                rss_bytes = rss,
                                threshold_bytes = threshold,
                                max_batch_size = halved,
                                "memory pressure: halving max batch size"
                            );
                            inner.effective_max.store(halved, Ordering::Relaxed);
                        }
                        restore_at = Some(Instant::now() + inner.config.memory_cooldown);
                    }
                    Some(_) => {
                        if restore_at.is_some_and(|at| Instant::now() >= at) {
                            let base = inner.config.max_batch_size;
                            inner.effective_max.store(base, Ordering::Relaxed);
                            restore_at = None;
                            debug!(max_batch_size = base, "memory pressure cleared");
                        }
                    }
                    None => debug!("memory sample unavailable"),
                }
                drop(inner);
                tokio::time::sleep(interval).await;
            }
        })
    }
}
