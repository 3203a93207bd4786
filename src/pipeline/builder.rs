//! Builder for configuring pipeline instances

use std::sync::Arc;

use crate::admission::{AdmissionGate, ProviderLimits};
use crate::batch::{BatchAggregator, BatchConfig, MemorySampler};
use crate::cache::{FingerprintCache, FingerprintConfig, KeyedCache, KeyedCacheConfig};

use super::Pipeline;

/// Main entry point for creating pipeline instances.
pub struct Heimdallr;

impl Heimdallr {
    /// Create a new builder for configuring the pipeline.
    pub fn builder() -> HeimdallrBuilder {
        HeimdallrBuilder::new()
    }
}

/// Builder for configuring pipeline instances.
///
/// ```rust
/// # use heimdallr::{Heimdallr, ProviderLimits, BatchConfig};
/// # use std::time::Duration;
/// let pipeline = Heimdallr::builder()
///     .provider("openrouter", ProviderLimits::new().per_minute(20))
///     .batch(BatchConfig::new().max_batch_size(16))
///     .build();
/// ```
pub struct HeimdallrBuilder {
    providers: Vec<(String, ProviderLimits)>,
    batch: BatchConfig,
    fingerprint: FingerprintConfig,
    keyed_cache: Option<KeyedCacheConfig>,
    memory_sampler: Option<Arc<dyn MemorySampler>>,
}

impl HeimdallrBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            batch: BatchConfig::default(),
            fingerprint: FingerprintConfig::default(),
            keyed_cache: None,
            memory_sampler: None,
        }
    }

    /// Register a provider with its quota limits.
    pub fn provider(mut self, name: impl Into<String>, limits: ProviderLimits) -> Self {
        self.providers.push((name.into(), limits));
        self
    }

    /// Set the batch aggregator configuration.
    pub fn batch(mut self, config: BatchConfig) -> Self {
        self.batch = config;
        self
    }

    /// Set the fingerprint cache configuration.
    pub fn fingerprint(mut self, config: FingerprintConfig) -> Self {
        self.fingerprint = config;
        self
    }

    /// Enable the keyed TTL result cache.
    pub fn keyed_cache(mut self, config: KeyedCacheConfig) -> Self {
        self.keyed_cache = Some(config);
        self
    }

    /// Override the memory sampler used for adaptive batch sizing.
    pub fn memory_sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.memory_sampler = Some(sampler);
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Pipeline {
        let gate = AdmissionGate::new();
        for (name, limits) in self.providers {
            gate.configure(name, limits);
        }
        let aggregator = match self.memory_sampler {
            Some(sampler) => BatchAggregator::with_sampler(self.batch, sampler),
            None => BatchAggregator::new(self.batch),
        };
        let fingerprints = FingerprintCache::new(self.fingerprint);
        let results = self.keyed_cache.map(|config| KeyedCache::new(&config));
        Pipeline::new(gate, aggregator, fingerprints, results)
    }
}

impl Default for HeimdallrBuilder {
    fn default() -> Self {
        Self::new()
    }
}
