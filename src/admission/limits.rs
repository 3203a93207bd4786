//! Provider quota configuration and usage snapshots.

use std::time::Duration;

use serde::Serialize;

/// One sliding time-window quota.
///
/// A tier with a `category` tag only counts calls whose
/// [`ScheduleOptions::category`] matches, which is how sub-limits like
/// "deep operations per hour" are expressed alongside the blanket tiers.
#[derive(Debug, Clone)]
pub struct TierLimit {
    /// Window width.
    pub window: Duration,
    /// Maximum calls inside any trailing window of that width.
    pub limit: u32,
    /// Optional category tag scoping this tier to a subset of calls.
    pub category: Option<String>,
}

impl TierLimit {
    /// Create an untagged tier counting every call.
    pub fn new(window: Duration, limit: u32) -> Self {
        Self {
            window,
            limit,
            category: None,
        }
    }

    /// Scope this tier to calls tagged with `category`.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Quota configuration for one provider.
///
/// The general shape is a set of sliding-window tiers plus an optional
/// token-weighted tier over the trailing minute and an optional
/// minimum-spacing cooldown. Convenience setters cover the common
/// per-minute / per-hour / per-day tiers:
///
/// ```rust
/// # use heimdallr::ProviderLimits;
/// # use std::time::Duration;
/// let limits = ProviderLimits::new()
///     .per_minute(20)
///     .per_day(1_000)
///     .tokens_per_minute(40_000)
///     .cooldown(Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProviderLimits {
    /// Sliding-window tiers, all enforced independently.
    pub tiers: Vec<TierLimit>,
    /// Token budget over the trailing minute, checked against each call's
    /// estimated token cost.
    pub tokens_per_minute: Option<u64>,
    /// Minimum spacing between consecutive calls, enforced independently
    /// of the tier counts so under-quota bursts are still spread out.
    pub cooldown: Option<Duration>,
}

impl ProviderLimits {
    /// Create an empty configuration (no tiers, nothing enforced).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary tier.
    pub fn tier(mut self, tier: TierLimit) -> Self {
        self.tiers.push(tier);
        self
    }

    /// Add a calls-per-minute tier.
    pub fn per_minute(self, limit: u32) -> Self {
        self.tier(TierLimit::new(Duration::from_secs(60), limit))
    }

    /// Add a calls-per-hour tier.
    pub fn per_hour(self, limit: u32) -> Self {
        self.tier(TierLimit::new(Duration::from_secs(3600), limit))
    }

    /// Add a calls-per-day tier.
    pub fn per_day(self, limit: u32) -> Self {
        self.tier(TierLimit::new(Duration::from_secs(86_400), limit))
    }

    /// Set the trailing-minute token budget.
    pub fn tokens_per_minute(mut self, budget: u64) -> Self {
        self.tokens_per_minute = Some(budget);
        self
    }

    /// Set the minimum spacing between consecutive calls.
    pub fn cooldown(mut self, spacing: Duration) -> Self {
        self.cooldown = Some(spacing);
        self
    }
}

/// Per-call options for [`AdmissionGate`](super::AdmissionGate) operations.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
    /// Category tag matched against category-scoped tiers.
    pub category: Option<String>,
    /// Estimated token cost, checked against the token budget when one
    /// is configured. Calls without an estimate count zero tokens.
    pub estimated_tokens: Option<u64>,
    /// Upper bound on admission wait. Exceeding it surfaces
    /// [`AdmissionTimeout`](crate::HeimdallrError::AdmissionTimeout)
    /// without running the task. `None` waits indefinitely.
    pub max_wait: Option<Duration>,
}

impl ScheduleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag this call with a category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the estimated token cost.
    pub fn estimated_tokens(mut self, tokens: u64) -> Self {
        self.estimated_tokens = Some(tokens);
        self
    }

    /// Bound the admission wait.
    pub fn max_wait(mut self, max: Duration) -> Self {
        self.max_wait = Some(max);
        self
    }
}

/// Usage of one tier at the instant of a [`stats`](super::AdmissionGate::stats) call.
#[derive(Debug, Clone, Serialize)]
pub struct TierUsage {
    pub window: Duration,
    pub limit: u32,
    pub used: u32,
    pub category: Option<String>,
}

/// Point-in-time usage snapshot for one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub tiers: Vec<TierUsage>,
    /// Token sum over the trailing minute, when a token budget is configured.
    pub tokens_last_minute: Option<u64>,
    /// Time since the last admitted or recorded call.
    pub last_call_age: Option<Duration>,
}
