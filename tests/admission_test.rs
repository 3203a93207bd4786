//! Tests for [`AdmissionGate`] — multi-tier sliding-window admission.
//!
//! All timing runs under tokio's paused clock (`start_paused`), so waits
//! of minutes resolve instantly and deterministically.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use heimdallr::{AdmissionGate, HeimdallrError, ProviderLimits, ScheduleOptions, TierLimit};
use tokio::time::Instant;

fn gate_with(limits: ProviderLimits) -> AdmissionGate {
    let gate = AdmissionGate::new();
    gate.configure("test", limits);
    gate
}

async fn run_noop(gate: &AdmissionGate, opts: &ScheduleOptions) -> heimdallr::Result<()> {
    gate.schedule("test", opts, || async { Ok(()) }).await
}

// =========================================================================
// Configuration errors
// =========================================================================

#[tokio::test]
async fn unknown_provider_is_an_error() {
    let gate = AdmissionGate::new();
    let result = run_noop(&gate, &ScheduleOptions::new()).await;
    assert!(matches!(result, Err(HeimdallrError::UnknownProvider(ref p)) if p == "test"));
}

#[tokio::test]
async fn estimate_over_token_budget_is_an_error() {
    let gate = gate_with(ProviderLimits::new().tokens_per_minute(1_000));
    let opts = ScheduleOptions::new().estimated_tokens(2_000);
    let result = run_noop(&gate, &opts).await;
    assert!(matches!(result, Err(HeimdallrError::Configuration(_))));
}

// =========================================================================
// Tier limits
// =========================================================================

#[tokio::test(start_paused = true)]
async fn admits_up_to_limit_without_waiting() {
    let gate = gate_with(ProviderLimits::new().per_minute(3));
    let start = Instant::now();
    for _ in 0..3 {
        run_noop(&gate, &ScheduleOptions::new()).await.unwrap();
    }
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn call_over_limit_waits_for_window() {
    let gate = gate_with(ProviderLimits::new().per_minute(3));
    let start = Instant::now();
    for _ in 0..4 {
        run_noop(&gate, &ScheduleOptions::new()).await.unwrap();
    }
    // The 4th call only fits once the 1st falls out of the window.
    assert!(start.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn admission_bound_holds_under_concurrency() {
    let gate = Arc::new(AdmissionGate::new());
    gate.configure("test", ProviderLimits::new().per_minute(4));

    let completions: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for _ in 0..10 {
        let gate = gate.clone();
        let completions = completions.clone();
        handles.push(tokio::spawn(async move {
            gate.schedule("test", &ScheduleOptions::new(), || async {
                completions.lock().unwrap().push(Instant::now());
                Ok(())
            })
            .await
            .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // At most 4 admissions within any trailing 60s window.
    let mut times = completions.lock().unwrap().clone();
    times.sort();
    assert_eq!(times.len(), 10);
    for window_start in 0..times.len() {
        let in_window = times
            .iter()
            .filter(|t| {
                **t >= times[window_start]
                    && t.duration_since(times[window_start]) < Duration::from_secs(60)
            })
            .count();
        assert!(in_window <= 4, "found {in_window} admissions in one window");
    }
}

#[tokio::test(start_paused = true)]
async fn category_tier_limits_only_tagged_calls() {
    let gate = gate_with(
        ProviderLimits::new()
            .per_minute(10)
            .tier(TierLimit::new(Duration::from_secs(60), 1).category("deep")),
    );

    let deep = ScheduleOptions::new().category("deep");
    run_noop(&gate, &deep).await.unwrap();

    // Untagged calls don't touch the "deep" tier.
    let start = Instant::now();
    run_noop(&gate, &ScheduleOptions::new()).await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);

    // A second tagged call waits for the category window.
    let start = Instant::now();
    run_noop(&gate, &deep).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(60));
}

// =========================================================================
// Token budget
// =========================================================================

#[tokio::test(start_paused = true)]
async fn token_budget_defers_over_budget_calls() {
    let gate = gate_with(ProviderLimits::new().tokens_per_minute(1_000));
    let opts = ScheduleOptions::new().estimated_tokens(600);

    run_noop(&gate, &opts).await.unwrap();

    // 600 + 600 > 1000, so the second call waits for the first to expire.
    let start = Instant::now();
    run_noop(&gate, &opts).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(60));
}

// =========================================================================
// Cooldown spacing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn cooldown_spaces_calls_under_quota() {
    let gate = gate_with(
        ProviderLimits::new()
            .per_minute(10)
            .cooldown(Duration::from_secs(5)),
    );
    let start = Instant::now();
    run_noop(&gate, &ScheduleOptions::new()).await.unwrap();
    run_noop(&gate, &ScheduleOptions::new()).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn blocked_calls_wait_at_least_the_cooldown() {
    // The tier frees a slot at 60s; the spacing floor pushes the
    // retry out to the full cooldown anyway.
    let gate = gate_with(
        ProviderLimits::new()
            .per_minute(1)
            .cooldown(Duration::from_secs(90)),
    );
    run_noop(&gate, &ScheduleOptions::new()).await.unwrap();

    let start = Instant::now();
    run_noop(&gate, &ScheduleOptions::new()).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(90));
}

#[tokio::test(start_paused = true)]
async fn five_calls_with_cooldown_spread_out() {
    // limit 4/min + 15s cooldown: consecutive completions are never
    // closer than 15s, including the 5th after the 4th.
    let gate = Arc::new(AdmissionGate::new());
    gate.configure(
        "test",
        ProviderLimits::new()
            .per_minute(4)
            .cooldown(Duration::from_secs(15)),
    );

    let completions: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for _ in 0..5 {
        let gate = gate.clone();
        let completions = completions.clone();
        handles.push(tokio::spawn(async move {
            gate.schedule("test", &ScheduleOptions::new(), || async {
                completions.lock().unwrap().push(Instant::now());
                Ok(())
            })
            .await
            .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut times = completions.lock().unwrap().clone();
    times.sort();
    assert_eq!(times.len(), 5);
    for pair in times.windows(2) {
        assert!(
            pair[1].duration_since(pair[0]) >= Duration::from_secs(15),
            "calls closer than the cooldown"
        );
    }
}

// =========================================================================
// Timeouts
// =========================================================================

#[tokio::test(start_paused = true)]
async fn wait_beyond_max_wait_times_out() {
    let gate = gate_with(ProviderLimits::new().per_minute(1));
    run_noop(&gate, &ScheduleOptions::new()).await.unwrap();

    let opts = ScheduleOptions::new().max_wait(Duration::from_secs(10));
    let result = run_noop(&gate, &opts).await;
    assert!(matches!(
        result,
        Err(HeimdallrError::AdmissionTimeout { ref provider, max_wait })
            if provider == "test" && max_wait == Duration::from_secs(10)
    ));
}

#[tokio::test(start_paused = true)]
async fn timeout_does_not_consume_quota() {
    let gate = gate_with(ProviderLimits::new().per_minute(1));
    run_noop(&gate, &ScheduleOptions::new()).await.unwrap();

    let opts = ScheduleOptions::new().max_wait(Duration::from_secs(1));
    let _ = run_noop(&gate, &opts).await;

    let stats = gate.stats("test").unwrap();
    assert_eq!(stats.tiers[0].used, 1);
}

#[tokio::test(start_paused = true)]
async fn max_wait_long_enough_still_admits() {
    let gate = gate_with(ProviderLimits::new().per_minute(1));
    run_noop(&gate, &ScheduleOptions::new()).await.unwrap();

    let opts = ScheduleOptions::new().max_wait(Duration::from_secs(120));
    let start = Instant::now();
    run_noop(&gate, &opts).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(60));
}

// =========================================================================
// Error propagation
// =========================================================================

#[tokio::test]
async fn task_errors_propagate_untouched() {
    let gate = gate_with(ProviderLimits::new().per_minute(10));
    let result: heimdallr::Result<()> = gate
        .schedule("test", &ScheduleOptions::new(), || async {
            Err(HeimdallrError::Provider("boom".into()))
        })
        .await;
    assert!(matches!(result, Err(HeimdallrError::Provider(ref m)) if m == "boom"));

    // The call was made; bookkeeping stays.
    let stats = gate.stats("test").unwrap();
    assert_eq!(stats.tiers[0].used, 1);
}

// =========================================================================
// Observation: would_exceed_limit / record_call / stats
// =========================================================================

#[tokio::test]
async fn would_exceed_limit_is_observational() {
    let gate = gate_with(ProviderLimits::new().per_minute(1));
    let opts = ScheduleOptions::new();

    assert!(!gate.would_exceed_limit("test", &opts).unwrap());
    // Asking twice records nothing.
    assert!(!gate.would_exceed_limit("test", &opts).unwrap());

    gate.record_call("test", &opts).unwrap();
    assert!(gate.would_exceed_limit("test", &opts).unwrap());
}

#[tokio::test]
async fn record_call_counts_external_traffic() {
    let gate = gate_with(ProviderLimits::new().per_minute(5).tokens_per_minute(1_000));
    gate.record_call("test", &ScheduleOptions::new().estimated_tokens(300))
        .unwrap();
    gate.record_call("test", &ScheduleOptions::new().estimated_tokens(200))
        .unwrap();

    let stats = gate.stats("test").unwrap();
    assert_eq!(stats.tiers[0].used, 2);
    assert_eq!(stats.tokens_last_minute, Some(500));
    assert!(stats.last_call_age.is_some());
}

#[tokio::test(start_paused = true)]
async fn stats_reflect_window_expiry() {
    let gate = gate_with(ProviderLimits::new().per_minute(5));
    run_noop(&gate, &ScheduleOptions::new()).await.unwrap();
    assert_eq!(gate.stats("test").unwrap().tiers[0].used, 1);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(gate.stats("test").unwrap().tiers[0].used, 0);
}

#[tokio::test]
async fn configure_replaces_limits() {
    let gate = gate_with(ProviderLimits::new().per_minute(1));
    gate.record_call("test", &ScheduleOptions::new()).unwrap();
    assert!(gate.would_exceed_limit("test", &ScheduleOptions::new()).unwrap());

    gate.configure("test", ProviderLimits::new().per_minute(100));
    assert!(!gate.would_exceed_limit("test", &ScheduleOptions::new()).unwrap());
}
