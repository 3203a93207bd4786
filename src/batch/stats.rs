//! Aggregator statistics with bounded rolling history.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

/// Mutable counters behind the aggregator's stats lock.
pub(crate) struct StatsState {
    window: usize,
    total_items: u64,
    batched_items: u64,
    single_items: u64,
    failed_flushes: u64,
    batch_sizes: VecDeque<usize>,
    flush_durations: VecDeque<Duration>,
}

impl StatsState {
    pub(crate) fn new(window: usize) -> Self {
        Self {
            window,
            total_items: 0,
            batched_items: 0,
            single_items: 0,
            failed_flushes: 0,
            batch_sizes: VecDeque::with_capacity(window),
            flush_durations: VecDeque::with_capacity(window),
        }
    }

    pub(crate) fn record_flush(&mut self, size: usize, duration: Duration, failed: bool) {
        self.total_items += size as u64;
        if size > 1 {
            self.batched_items += size as u64;
        } else {
            self.single_items += size as u64;
        }
        if failed {
            self.failed_flushes += 1;
        }
        push_bounded(&mut self.batch_sizes, size, self.window);
        push_bounded(&mut self.flush_durations, duration, self.window);
    }

    pub(crate) fn snapshot(&self, pending_items: usize, max_batch_size: usize) -> BatchStats {
        let avg_batch_size = if self.batch_sizes.is_empty() {
            0.0
        } else {
            self.batch_sizes.iter().sum::<usize>() as f64 / self.batch_sizes.len() as f64
        };
        let avg_flush_duration = if self.flush_durations.is_empty() {
            Duration::ZERO
        } else {
            self.flush_durations.iter().sum::<Duration>() / self.flush_durations.len() as u32
        };
        BatchStats {
            total_items: self.total_items,
            batched_items: self.batched_items,
            single_items: self.single_items,
            failed_flushes: self.failed_flushes,
            avg_batch_size,
            avg_flush_duration,
            pending_items,
            max_batch_size,
        }
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, value: T, window: usize) {
    if history.len() == window {
        history.pop_front();
    }
    history.push_back(value);
}

/// Point-in-time aggregator statistics.
///
/// Rolling averages cover a bounded history window (see
/// [`BatchConfig::stats_window`](super::BatchConfig::stats_window)), so
/// long-running processes don't accumulate unbounded samples.
#[derive(Debug, Clone, Serialize)]
pub struct BatchStats {
    /// Items settled since construction.
    pub total_items: u64,
    /// Items settled via a true multi-item flush.
    pub batched_items: u64,
    /// Items settled via the single-item path.
    pub single_items: u64,
    /// Flushes whose processor call failed.
    pub failed_flushes: u64,
    /// Rolling average flush size.
    pub avg_batch_size: f64,
    /// Rolling average flush duration (processor call included).
    pub avg_flush_duration: Duration,
    /// Items currently queued across all pending batches.
    pub pending_items: usize,
    /// Current effective max batch size (halved under memory pressure).
    pub max_batch_size: usize,
}
