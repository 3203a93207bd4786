//! Sliding-window bookkeeping for admission tiers.
//!
//! Each tier keeps a rolling log of call timestamps; entries older than
//! the tier's window width are pruned on every check. The token window
//! is the same shape with a weight attached to each entry and a running
//! sum maintained incrementally so checks stay O(pruned).

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Rolling timestamp log for one call-count tier.
///
/// Invariant: after pruning, the log never holds more than `limit`
/// entries at the instant a new call is admitted.
pub(crate) struct TierWindow {
    pub(crate) width: Duration,
    pub(crate) limit: u32,
    /// When set, this tier only counts calls tagged with the same category.
    pub(crate) category: Option<String>,
    timestamps: VecDeque<Instant>,
}

impl TierWindow {
    pub(crate) fn new(width: Duration, limit: u32, category: Option<String>) -> Self {
        Self {
            width,
            limit,
            category,
            timestamps: VecDeque::new(),
        }
    }

    /// Whether a call with the given category tag counts against this tier.
    ///
    /// Untagged tiers count every call; tagged tiers count only calls
    /// carrying the matching tag.
    pub(crate) fn applies_to(&self, category: Option<&str>) -> bool {
        match &self.category {
            None => true,
            Some(c) => category == Some(c.as_str()),
        }
    }

    /// Drop entries that have aged out of the window.
    pub(crate) fn prune(&mut self, now: Instant) {
        while let Some(front) = self.timestamps.front() {
            if now.duration_since(*front) >= self.width {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Pruned entry count.
    pub(crate) fn count(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether an additional call fits under this tier's limit.
    ///
    /// Callers must prune first.
    pub(crate) fn has_capacity(&self) -> bool {
        self.timestamps.len() < self.limit as usize
    }

    /// The instant the oldest entry ages out, freeing one slot.
    ///
    /// `None` when the log is empty (a slot is free right now).
    pub(crate) fn next_slot(&self) -> Option<Instant> {
        self.timestamps.front().map(|oldest| *oldest + self.width)
    }

    pub(crate) fn record(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }
}

/// Rolling token-weighted log over a fixed trailing window.
pub(crate) struct TokenWindow {
    pub(crate) budget: u64,
    width: Duration,
    entries: VecDeque<(Instant, u64)>,
    sum: u64,
}

impl TokenWindow {
    pub(crate) fn new(budget: u64, width: Duration) -> Self {
        Self {
            budget,
            width,
            entries: VecDeque::new(),
            sum: 0,
        }
    }

    pub(crate) fn prune(&mut self, now: Instant) {
        while let Some((ts, tokens)) = self.entries.front() {
            if now.duration_since(*ts) >= self.width {
                self.sum -= *tokens;
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether adding `estimate` tokens would push the trailing-window sum
    /// over budget. Callers must prune first.
    pub(crate) fn would_exceed(&self, estimate: u64) -> bool {
        self.sum + estimate > self.budget
    }

    /// Running token sum over the trailing window.
    pub(crate) fn sum(&self) -> u64 {
        self.sum
    }

    /// The earliest instant at which `estimate` tokens fit under budget,
    /// assuming no further calls land in the meantime.
    ///
    /// Walks entries oldest-first until enough weight has expired. `None`
    /// when the estimate already fits or can never fit (estimate > budget).
    pub(crate) fn next_fit(&self, estimate: u64) -> Option<Instant> {
        if estimate > self.budget || !self.would_exceed(estimate) {
            return None;
        }
        let mut remaining = self.sum;
        for (ts, tokens) in &self.entries {
            remaining -= tokens;
            if remaining + estimate <= self.budget {
                return Some(*ts + self.width);
            }
        }
        None
    }

    pub(crate) fn record(&mut self, now: Instant, tokens: u64) {
        self.sum += tokens;
        self.entries.push_back((now, tokens));
    }
}
