//! The outbound-call seam consumed by the aggregator.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// What the processor receives: either one item's payload (single-item
/// flush, bypassing batch overhead) or the whole flush's payloads.
#[derive(Debug, Clone)]
pub enum BatchInput {
    Single(Value),
    Many(Vec<Value>),
}

/// What the processor returns.
///
/// For a multi-item flush, `Many` must be positionally aligned with the
/// input array — this is an explicit contract requirement, and a length
/// mismatch fails the whole flush loudly rather than misassigning
/// results. `Single` is treated as one shared result for every item.
#[derive(Debug, Clone)]
pub enum BatchOutput {
    Single(Value),
    Many(Vec<Value>),
}

/// Options the aggregator passes alongside a flush.
#[derive(Debug, Clone, Default)]
pub struct FlushOptions {
    /// Whether this call carries a true multi-item batch.
    pub batched: bool,
    /// Number of items in the flush.
    pub size: usize,
    /// Per-item options, aligned with the payload array.
    pub item_options: Vec<Value>,
}

/// Performs the actual outbound provider call for one logical operation.
///
/// Supplied by the embedding application per [`process`] call; all
/// callers submitting to the same operation name must supply
/// interchangeable processors, since one flush makes one call on behalf
/// of every item it captured.
///
/// [`process`]: super::BatchAggregator::process
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    async fn run(&self, input: BatchInput, options: &FlushOptions) -> Result<BatchOutput>;
}
