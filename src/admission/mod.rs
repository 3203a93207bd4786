//! Multi-tier sliding-window admission control.
//!
//! [`AdmissionGate`] decides when an outbound provider call may proceed.
//! Each provider carries a set of sliding time-window tiers (per-minute,
//! per-hour, per-day, category-scoped sub-limits), an optional
//! token-weighted tier over the trailing minute, and an optional
//! minimum-spacing cooldown. A call is admitted only when every
//! applicable tier has capacity; otherwise the caller is suspended until
//! the earliest instant a slot could free up, then re-checked, since
//! another caller may win the slot first.
//!
//! Timestamps are recorded *at admission*, before the task runs, so a
//! burst of concurrent callers cannot all observe "not yet at limit"
//! simultaneously. Bookkeeping is kept whether the task later succeeds
//! or fails — the call was made either way. The gate never retries;
//! task errors propagate to the caller untouched.
//!
//! Ordering under contention is approximately submission order, not
//! strict FIFO: a call that becomes admissible first may run before one
//! submitted earlier if quotas free up unevenly across tiers.

mod limits;
mod window;

pub use limits::{ProviderLimits, ProviderStats, ScheduleOptions, TierLimit, TierUsage};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::telemetry;
use crate::{HeimdallrError, Result};

use window::{TierWindow, TokenWindow};

/// Token budgets are enforced over the trailing minute.
const TOKEN_WINDOW: Duration = Duration::from_secs(60);

/// Raise the retry instant to `at` when `at` is later.
fn push_retry(retry_at: &mut Option<Instant>, at: Instant) {
    *retry_at = Some(retry_at.map_or(at, |cur| cur.max(at)));
}

struct ProviderState {
    limits: ProviderLimits,
    tiers: Vec<TierWindow>,
    tokens: Option<TokenWindow>,
    last_call: Option<Instant>,
}

impl ProviderState {
    fn new(limits: ProviderLimits) -> Self {
        let tiers = limits
            .tiers
            .iter()
            .map(|t| TierWindow::new(t.window, t.limit, t.category.clone()))
            .collect();
        let tokens = limits
            .tokens_per_minute
            .map(|budget| TokenWindow::new(budget, TOKEN_WINDOW));
        Self {
            limits,
            tiers,
            tokens,
            last_call: None,
        }
    }

    /// Check all tiers against a prospective call. Returns `None` when the
    /// call is admissible now, otherwise the earliest instant worth
    /// re-checking at.
    fn blocked_until(&mut self, now: Instant, opts: &ScheduleOptions) -> Result<Option<Instant>> {
        let category = opts.category.as_deref();
        let estimate = opts.estimated_tokens.unwrap_or(0);
        let mut retry_at: Option<Instant> = None;

        for tier in &mut self.tiers {
            if !tier.applies_to(category) {
                continue;
            }
            tier.prune(now);
            if !tier.has_capacity() {
                if let Some(at) = tier.next_slot() {
                    push_retry(&mut retry_at, at);
                }
            }
        }

        if let Some(tokens) = &mut self.tokens {
            tokens.prune(now);
            if estimate > tokens.budget {
                return Err(HeimdallrError::Configuration(format!(
                    "estimated tokens ({estimate}) exceed per-minute budget ({})",
                    tokens.budget
                )));
            }
            if tokens.would_exceed(estimate) {
                if let Some(at) = tokens.next_fit(estimate) {
                    push_retry(&mut retry_at, at);
                }
            }
        }

        if let (Some(spacing), Some(last)) = (self.limits.cooldown, self.last_call) {
            if now.duration_since(last) < spacing {
                push_retry(&mut retry_at, last + spacing);
            }
        }

        // Not admissible: wait at least the configured minimum spacing,
        // even when the limiting tier frees a slot sooner.
        if retry_at.is_some() {
            if let Some(spacing) = self.limits.cooldown {
                push_retry(&mut retry_at, now + spacing);
            }
        }

        Ok(retry_at)
    }

    /// Record an admitted call across every applicable tier.
    fn record(&mut self, now: Instant, opts: &ScheduleOptions) {
        let category = opts.category.as_deref();
        for tier in &mut self.tiers {
            if tier.applies_to(category) {
                tier.record(now);
            }
        }
        if let Some(tokens) = &mut self.tokens {
            tokens.record(now, opts.estimated_tokens.unwrap_or(0));
        }
        self.last_call = Some(now);
    }
}

/// Sliding-window admission gate, keyed by provider name.
///
/// Construct one instance at startup and share it by reference; there is
/// no process-wide singleton. Providers are registered (and re-registered)
/// via [`configure`](Self::configure).
///
/// ```rust
/// # use heimdallr::{AdmissionGate, ProviderLimits, ScheduleOptions};
/// # async fn demo() -> heimdallr::Result<()> {
/// let gate = AdmissionGate::new();
/// gate.configure("openrouter", ProviderLimits::new().per_minute(20));
///
/// let response = gate
///     .schedule("openrouter", &ScheduleOptions::new(), || async {
///         // outbound provider call goes here
///         Ok("answer".to_string())
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct AdmissionGate {
    providers: Mutex<HashMap<String, ProviderState>>,
}

impl AdmissionGate {
    /// Create a gate with no providers registered.
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a provider or replace its limits.
    ///
    /// Replacing limits resets the provider's usage windows; the common
    /// case is registration at startup, before traffic.
    pub fn configure(&self, provider: impl Into<String>, limits: ProviderLimits) {
        let mut providers = self.providers.lock().expect("admission lock poisoned");
        providers.insert(provider.into(), ProviderState::new(limits));
    }

    /// Queue a unit of work and return its result once admitted and executed.
    ///
    /// Suspends until every tier for `provider` has capacity (bounded by
    /// `opts.max_wait`), records the call, then runs `task`. Task errors
    /// propagate untouched; the recorded timestamps stay either way.
    pub async fn schedule<T, F, Fut>(
        &self,
        provider: &str,
        opts: &ScheduleOptions,
        task: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let deadline = opts.max_wait.map(|w| start + w);

        loop {
            let decision = {
                let mut providers = self.providers.lock().expect("admission lock poisoned");
                let state = providers
                    .get_mut(provider)
                    .ok_or_else(|| HeimdallrError::UnknownProvider(provider.to_string()))?;
                let now = Instant::now();
                match state.blocked_until(now, opts)? {
                    None => {
                        state.record(now, opts);
                        None
                    }
                    Some(at) => Some(at),
                }
            };

            match decision {
                None => break,
                Some(retry_at) => {
                    // Slots only free by time passing, and concurrent callers
                    // can only push the next slot later. If even the earliest
                    // re-check is past the deadline, waiting cannot help.
                    if let Some(deadline) = deadline {
                        if retry_at > deadline {
                            metrics::counter!(telemetry::ADMISSION_TIMEOUTS_TOTAL,
                                "provider" => provider.to_owned())
                            .increment(1);
                            return Err(HeimdallrError::AdmissionTimeout {
                                provider: provider.to_string(),
                                max_wait: opts.max_wait.unwrap_or_default(),
                            });
                        }
                    }
                    let wait = retry_at.duration_since(Instant::now());
                    debug!(
                        provider,
                        wait_ms = wait.as_millis() as u64,
                        "waiting for admission slot"
                    );
                    tokio::time::sleep_until(retry_at).await;
                }
            }
        }

        let waited = start.elapsed();
        metrics::counter!(telemetry::ADMITTED_TOTAL, "provider" => provider.to_owned())
            .increment(1);
        metrics::histogram!(telemetry::ADMISSION_WAIT_SECONDS, "provider" => provider.to_owned())
            .record(waited.as_secs_f64());

        task().await
    }

    /// Whether a call with these options would be deferred right now.
    ///
    /// Purely observational — nothing is recorded.
    pub fn would_exceed_limit(&self, provider: &str, opts: &ScheduleOptions) -> Result<bool> {
        let mut providers = self.providers.lock().expect("admission lock poisoned");
        let state = providers
            .get_mut(provider)
            .ok_or_else(|| HeimdallrError::UnknownProvider(provider.to_string()))?;
        Ok(state.blocked_until(Instant::now(), opts)?.is_some())
    }

    /// Record a call made outside [`schedule`](Self::schedule), so
    /// externally-dispatched traffic still counts against the quotas.
    pub fn record_call(&self, provider: &str, opts: &ScheduleOptions) -> Result<()> {
        let mut providers = self.providers.lock().expect("admission lock poisoned");
        let state = providers
            .get_mut(provider)
            .ok_or_else(|| HeimdallrError::UnknownProvider(provider.to_string()))?;
        state.record(Instant::now(), opts);
        Ok(())
    }

    /// Point-in-time usage snapshot for one provider.
    pub fn stats(&self, provider: &str) -> Result<ProviderStats> {
        let mut providers = self.providers.lock().expect("admission lock poisoned");
        let state = providers
            .get_mut(provider)
            .ok_or_else(|| HeimdallrError::UnknownProvider(provider.to_string()))?;
        let now = Instant::now();
        let tiers = state
            .tiers
            .iter_mut()
            .map(|tier| {
                tier.prune(now);
                TierUsage {
                    window: tier.width,
                    limit: tier.limit,
                    used: tier.count() as u32,
                    category: tier.category.clone(),
                }
            })
            .collect();
        let tokens_last_minute = state.tokens.as_mut().map(|tokens| {
            tokens.prune(now);
            tokens.sum()
        });
        Ok(ProviderStats {
            tiers,
            tokens_last_minute,
            last_call_age: state.last_call.map(|last| now.duration_since(last)),
        })
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}
