//! Composition of the three cost-optimization components.
//!
//! [`Pipeline`] owns one [`AdmissionGate`], one [`BatchAggregator`], and
//! one [`FingerprintCache`] — explicit instances constructed once by the
//! embedding application, never process-wide singletons. It runs the
//! per-caller control flow: duplicate lookup → on miss, admission-gated
//! batch or direct call → result stored for future duplicates.
//!
//! The duplicate lookup runs *before* admission: a hit makes no outbound
//! call, so it must neither consume a quota slot nor record a call
//! timestamp (the gate records at admission time).

mod builder;

pub use builder::{Heimdallr, HeimdallrBuilder};

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::admission::{AdmissionGate, ScheduleOptions};
use crate::batch::{BatchAggregator, BatchInput, BatchOutput, BatchProcessor, FlushOptions};
use crate::cache::{ContentType, FingerprintCache, KeyedCache};
use crate::{HeimdallrError, Result};

/// Per-call options for [`Pipeline::execute`].
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Normalization mode for duplicate detection. Default: prose.
    pub content_type: ContentType,
    /// Whether this operation may be merged into a batch. Default: false.
    pub batchable: bool,
    /// Whether to consult and populate the fingerprint cache. Default: true.
    pub reuse: bool,
    /// Admission options (category, token estimate, max wait).
    pub schedule: ScheduleOptions,
    /// Opaque per-item options forwarded to the processor.
    pub item_options: Value,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            content_type: ContentType::Prose,
            batchable: false,
            reuse: true,
            schedule: ScheduleOptions::default(),
            item_options: Value::Null,
        }
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content type for duplicate detection.
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Allow this call to be merged into a batch.
    pub fn batchable(mut self, batchable: bool) -> Self {
        self.batchable = batchable;
        self
    }

    /// Enable or disable duplicate detection for this call.
    pub fn reuse(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self
    }

    /// Set the admission options.
    pub fn schedule(mut self, schedule: ScheduleOptions) -> Self {
        self.schedule = schedule;
        self
    }

    /// Set opaque per-item options forwarded to the processor.
    pub fn item_options(mut self, options: Value) -> Self {
        self.item_options = options;
        self
    }
}

/// The cost-optimization request pipeline.
///
/// Built via [`Heimdallr::builder()`]. Components are also reachable
/// individually for callers that want to drive the control flow
/// themselves (e.g. [`gate`](Self::gate) for externally-dispatched
/// traffic that still must count against quotas).
pub struct Pipeline {
    gate: AdmissionGate,
    aggregator: BatchAggregator,
    fingerprints: FingerprintCache,
    results: Option<KeyedCache>,
}

impl Pipeline {
    pub(crate) fn new(
        gate: AdmissionGate,
        aggregator: BatchAggregator,
        fingerprints: FingerprintCache,
        results: Option<KeyedCache>,
    ) -> Self {
        Self {
            gate,
            aggregator,
            fingerprints,
            results,
        }
    }

    /// Run one caller's request through the pipeline.
    ///
    /// Checks for previously-answered near-duplicate work first; on a
    /// miss, waits for admission, then either merges the call into a
    /// batch (`batchable`) or invokes the processor directly, and stores
    /// the result for future duplicates.
    pub async fn execute(
        &self,
        provider: &str,
        operation: &str,
        content: &str,
        processor: Arc<dyn BatchProcessor>,
        opts: &ExecuteOptions,
    ) -> Result<Value> {
        if opts.reuse {
            if let Some(found) = self.fingerprints.find_similar(content, opts.content_type) {
                debug!(
                    provider,
                    operation,
                    similarity = found.similarity,
                    exact = found.exact,
                    "duplicate detected, skipping provider call"
                );
                return Ok(found.entry.value);
            }
        }

        let result = self
            .gate
            .schedule(provider, &opts.schedule, || async {
                if opts.batchable {
                    self.aggregator
                        .process(
                            operation,
                            Value::String(content.to_owned()),
                            processor.clone(),
                            opts.item_options.clone(),
                        )
                        .await
                } else {
                    direct_call(&processor, content, &opts.item_options).await
                }
            })
            .await?;

        if opts.reuse {
            self.fingerprints
                .add_to_cache(content, opts.content_type, result.clone(), None);
        }
        Ok(result)
    }

    /// The admission gate.
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// The batch aggregator.
    pub fn aggregator(&self) -> &BatchAggregator {
        &self.aggregator
    }

    /// The fingerprint cache.
    pub fn fingerprints(&self) -> &FingerprintCache {
        &self.fingerprints
    }

    /// The keyed result cache, when one was configured.
    pub fn results(&self) -> Option<&KeyedCache> {
        self.results.as_ref()
    }

    /// Shut down the aggregator, rejecting all queued items.
    pub fn shutdown(&self) {
        self.aggregator.shutdown();
    }
}

/// Invoke the processor for one unbatched item.
async fn direct_call(
    processor: &Arc<dyn BatchProcessor>,
    content: &str,
    item_options: &Value,
) -> Result<Value> {
    let options = FlushOptions {
        batched: false,
        size: 1,
        item_options: vec![item_options.clone()],
    };
    let input = BatchInput::Single(Value::String(content.to_owned()));
    match processor.run(input, &options).await? {
        BatchOutput::Single(value) => Ok(value),
        BatchOutput::Many(mut values) if values.len() == 1 => Ok(values.remove(0)),
        BatchOutput::Many(values) => Err(HeimdallrError::ItemFailure(format!(
            "expected a single result, got {} results",
            values.len()
        ))),
    }
}
