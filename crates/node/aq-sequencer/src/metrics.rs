//! Sequencer metrics.

use crate::state::SequencerPhase;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct PhaseLabels {
    phase: String,
}

/// Metrics of the sequencer loop, registered under the `sequencer` prefix
#[derive(Debug, Clone)]
pub struct SequencerMetrics {
    published_blocks: Counter,
    failed_blocks: Counter,
    block_build_duration: Histogram,
    tree_insertion_duration: Histogram,
    attestation_collection_duration: Histogram,
    state_transition_buffer_ms: Family<PhaseLabels, Histogram>,
}

impl SequencerMetrics {
    /// Create metrics and register them
    pub fn new(registry: &mut Registry) -> Self {
        let registry = registry.sub_registry_with_prefix("sequencer");

        let published_blocks = Counter::default();
        registry.register(
            "published_blocks",
            "Number of blocks published to the rollup contract",
            published_blocks.clone(),
        );

        let failed_blocks = Counter::default();
        registry.register(
            "failed_blocks",
            "Number of block builds or publications that failed",
            failed_blocks.clone(),
        );

        let block_build_duration = Histogram::new(exponential_buckets(0.1, 2.0, 10));
        registry.register(
            "block_build_duration_seconds",
            "Time from build start to publication",
            block_build_duration.clone(),
        );

        let tree_insertion_duration = Histogram::new(exponential_buckets(0.001, 4.0, 10));
        registry.register(
            "tree_insertion_duration_seconds",
            "Time spent inserting processed txs into the rollup trees",
            tree_insertion_duration.clone(),
        );

        let attestation_collection_duration = Histogram::new(exponential_buckets(0.1, 2.0, 8));
        registry.register(
            "attestation_collection_duration_seconds",
            "Time waiting for the attestation quorum",
            attestation_collection_duration.clone(),
        );

        let state_transition_buffer_ms = Family::<PhaseLabels, Histogram>::new_with_constructor(
            || {
                Histogram::new(
                    [
                        -5000.0, -1000.0, -250.0, 0.0, 250.0, 1000.0, 2500.0, 5000.0, 10000.0,
                    ]
                    .into_iter(),
                )
            },
        );
        registry.register(
            "state_transition_buffer_ms",
            "Margin left before the deadline when entering a restricted phase",
            state_transition_buffer_ms.clone(),
        );

        Self {
            published_blocks,
            failed_blocks,
            block_build_duration,
            tree_insertion_duration,
            attestation_collection_duration,
            state_transition_buffer_ms,
        }
    }

    pub(crate) fn record_published_block(&self, build_duration: Duration) {
        self.published_blocks.inc();
        self.block_build_duration.observe(build_duration.as_secs_f64());
    }

    pub(crate) fn record_failed_block(&self) {
        self.failed_blocks.inc();
    }

    pub(crate) fn record_tree_insertion(&self, duration: Duration) {
        self.tree_insertion_duration.observe(duration.as_secs_f64());
    }

    pub(crate) fn record_attestation_collection(&self, duration: Duration) {
        self.attestation_collection_duration.observe(duration.as_secs_f64());
    }

    pub(crate) fn record_state_transition_buffer(&self, phase: SequencerPhase, buffer_ms: f64) {
        self.state_transition_buffer_ms
            .get_or_create(&PhaseLabels {
                phase: phase.as_str().to_string(),
            })
            .observe(buffer_ms);
    }

    #[cfg(test)]
    pub(crate) fn published_blocks_count(&self) -> u64 {
        self.published_blocks.get()
    }

    #[cfg(test)]
    pub(crate) fn failed_blocks_count(&self) -> u64 {
        self.failed_blocks.get()
    }
}
