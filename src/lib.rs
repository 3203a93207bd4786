//! Heimdallr - Cost-optimization request pipeline for LLM API calls
//!
//! This crate sits between a caller wanting "ask provider X to do
//! operation Y" and the actual outbound call, and keeps provider spend
//! under control three ways:
//!
//! - [`AdmissionGate`] — multi-tier sliding-window quotas (per-minute /
//!   per-hour / per-day / category sub-limits, token budgets, call
//!   spacing) so outbound volume never exceeds provider limits;
//! - [`BatchAggregator`] — merges near-simultaneous single-item calls
//!   into one provider call and fans results back to each caller;
//! - [`FingerprintCache`] — detects that a request is an exact or
//!   near-duplicate of previously-answered work and skips the call.
//!
//! The components are independent instances owned by the embedding
//! application — compose them yourself, or use the [`Pipeline`] facade:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use heimdallr::{
//!     BatchInput, BatchOutput, BatchProcessor, ExecuteOptions, FlushOptions, Heimdallr,
//!     ProviderLimits, Result,
//! };
//! use serde_json::{Value, json};
//!
//! struct EchoProcessor;
//!
//! #[async_trait::async_trait]
//! impl BatchProcessor for EchoProcessor {
//!     async fn run(&self, input: BatchInput, _options: &FlushOptions) -> Result<BatchOutput> {
//!         // the actual outbound provider call goes here
//!         match input {
//!             BatchInput::Single(payload) => Ok(BatchOutput::Single(json!({"echo": payload}))),
//!             BatchInput::Many(payloads) => Ok(BatchOutput::Many(
//!                 payloads.into_iter().map(|p| json!({"echo": p})).collect(),
//!             )),
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let pipeline = Heimdallr::builder()
//!         .provider("openrouter", ProviderLimits::new().per_minute(20))
//!         .build();
//!
//!     let result = pipeline
//!         .execute(
//!             "openrouter",
//!             "summarize",
//!             "What is the capital of France?",
//!             Arc::new(EchoProcessor),
//!             &ExecuteOptions::new().batchable(true),
//!         )
//!         .await?;
//!
//!     println!("{result}");
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency model
//!
//! State mutations (window prune, batch swap, cache insert/evict) are
//! short synchronous critical sections; suspension happens only while
//! waiting for an admission slot or a flush to settle. There is no
//! retry/backoff here — a circuit-breaker collaborator owns that — and
//! cache state does not persist across restarts.

pub mod admission;
pub mod batch;
pub mod cache;
pub mod error;
pub mod pipeline;
pub mod telemetry;

// Re-export main types at crate root
pub use error::{HeimdallrError, Result};
pub use pipeline::{ExecuteOptions, Heimdallr, HeimdallrBuilder, Pipeline};

// Re-export component types
pub use admission::{
    AdmissionGate, ProviderLimits, ProviderStats, ScheduleOptions, TierLimit, TierUsage,
};
pub use batch::{
    BatchAggregator, BatchConfig, BatchInput, BatchOutput, BatchProcessor, BatchStats,
    FlushOptions, MemorySampler, ProcSelfSampler,
};
pub use cache::{
    CacheEntry, ContentType, Fingerprint, FingerprintCache, FingerprintConfig, KeyedCache,
    KeyedCacheConfig, SimilarityMatch,
};
