//! Block assembly over forked world state.
//!
//! A build forks the world state twice: the public processor executes
//! transactions on one fork while the block builder inserts their effects
//! into the rollup trees on the other. Mutations never reach the canonical
//! trees; closing the forks discards them, which is the entire rollback story
//! of a failed build.

use crate::config::{RollupConstants, SequencerConfig};
use crate::error::SequencerError;
use crate::metrics::SequencerMetrics;
use crate::state::SequencerPhase;
use crate::timetable::TimeTable;
use aq_client_api::{
    BlockBuilderFactory, L1ToL2MessageSource, ProcessLimits, PublicProcessor,
    PublicProcessorFactory, RollupBlockBuilder, TxPool, TxValidationPolicy, WorldState,
    WorldStateFork,
};
use aq_core_primitives::block::{BlockHeader, GlobalVariables, L2Block};
use aq_core_primitives::hashes::{Digest, TxHash};
use aq_core_primitives::slots::BlockNumber;
use aq_core_primitives::tx::Tx;
use futures::stream::BoxStream;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Grace period between the end of a build and releasing its forks, so a
/// transaction interrupted by the processing deadline is not dropped onto a
/// closed fork
const FORK_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Options for one build
#[derive(Debug, Default, Copy, Clone)]
pub(crate) struct BuildOptions {
    /// Re-execution of a foreign proposal: skip the minimum-tx gate
    pub(crate) validate_only: bool,
    /// A flush was requested: skip the minimum-tx gate for this block
    pub(crate) flushing: bool,
}

/// Outcome of a successful build
#[derive(Debug)]
pub(crate) struct BuildResult {
    /// The completed block
    pub(crate) block: L2Block,
    /// Time the public processor spent executing
    pub(crate) processor_duration: Duration,
    /// L1→L2 messages consumed by the block
    pub(crate) num_msgs: usize,
    /// Transactions included in the block
    pub(crate) num_txs: usize,
    /// When the build started; publication latency is measured from here
    pub(crate) build_started_at: Instant,
}

/// Assembles one block at a time from pool transactions.
///
/// Shared between the work loop and the proposal re-execution callback
/// registered with the validator client.
#[derive(Debug, Clone)]
pub(crate) struct BlockAssembler<WS, PPF, BBF, MS, TP>
where
    WS: WorldState,
{
    world_state: WS,
    processor_factory: PPF,
    builder_factory: BBF,
    message_source: MS,
    tx_pool: TP,
    constants: RollupConstants,
    metrics: SequencerMetrics,
}

impl<WS, PPF, BBF, MS, TP> BlockAssembler<WS, PPF, BBF, MS, TP>
where
    WS: WorldState,
    PPF: PublicProcessorFactory<WS::Fork>,
    BBF: BlockBuilderFactory<WS::Fork>,
    MS: L1ToL2MessageSource,
    TP: TxPool,
{
    pub(crate) fn new(
        world_state: WS,
        processor_factory: PPF,
        builder_factory: BBF,
        message_source: MS,
        tx_pool: TP,
        constants: RollupConstants,
        metrics: SequencerMetrics,
    ) -> Self {
        Self {
            world_state,
            processor_factory,
            builder_factory,
            message_source,
            tx_pool,
            constants,
            metrics,
        }
    }

    /// Build a block for the given globals out of the provided transactions.
    ///
    /// Any failure propagates; by the time the error reaches the caller the
    /// only mutated state lives in the two forks, which are already scheduled
    /// for closing.
    pub(crate) async fn build_block(
        &self,
        txs: BoxStream<'static, Tx>,
        global_variables: GlobalVariables,
        historical_header: Option<BlockHeader>,
        config: &SequencerConfig,
        table: &TimeTable,
        opts: BuildOptions,
    ) -> Result<BuildResult, SequencerError> {
        let block_number = global_variables.block_number;
        let build_started_at = Instant::now();

        let l1_to_l2_messages = self.message_source.l1_to_l2_messages(block_number).await?;
        let num_msgs = l1_to_l2_messages.len();
        debug!(%block_number, num_msgs, "Starting block build");

        let parent = block_number
            .checked_sub(BlockNumber::ONE)
            .unwrap_or(BlockNumber::ZERO);
        self.world_state.sync_immediate(parent).await?;

        let processor_fork = self.world_state.fork().await?;
        let builder_fork = match self.world_state.fork().await {
            Ok(fork) => fork,
            Err(error) => {
                defer_fork_close(processor_fork);
                return Err(error.into());
            }
        };

        let result = self
            .build_on_forks(
                &processor_fork,
                &builder_fork,
                txs,
                global_variables,
                historical_header,
                l1_to_l2_messages,
                config,
                table,
                opts,
            )
            .await;

        defer_fork_close(processor_fork);
        defer_fork_close(builder_fork);

        let (block, processor_duration, num_txs) = result?;
        Ok(BuildResult {
            block,
            processor_duration,
            num_msgs,
            num_txs,
            build_started_at,
        })
    }

    #[expect(clippy::too_many_arguments, reason = "Internals of a single build")]
    async fn build_on_forks(
        &self,
        processor_fork: &WS::Fork,
        builder_fork: &WS::Fork,
        txs: BoxStream<'static, Tx>,
        global_variables: GlobalVariables,
        historical_header: Option<BlockHeader>,
        l1_to_l2_messages: Vec<Digest>,
        config: &SequencerConfig,
        table: &TimeTable,
        opts: BuildOptions,
    ) -> Result<(L2Block, Duration, usize), SequencerError> {
        let mut processor = self.processor_factory.create(
            processor_fork.clone(),
            historical_header,
            global_variables,
            true,
        );
        let mut builder = self.builder_factory.create(builder_fork.clone());

        builder
            .start_new_block(global_variables, l1_to_l2_messages)
            .await?;

        let limits = ProcessLimits {
            deadline_unix_ms: self.processing_deadline(table, global_variables),
            max_transactions: config.max_txs_per_block,
            max_block_size_in_bytes: config.max_block_size_in_bytes,
        };
        let policy = TxValidationPolicy {
            allowed_in_setup: config.allowed_in_setup.clone(),
            enforce_fees: config.enforce_fees,
        };

        let processing_started = Instant::now();
        let (processed, failed) = processor.process(txs, limits, &policy).await?;
        let processor_duration = processing_started.elapsed();

        if !failed.is_empty() {
            let hashes: Vec<TxHash> = failed.iter().map(|tx| tx.hash).collect();
            for tx in &failed {
                trace!(hash = %tx.hash, reason = %tx.reason, "Tx failed public processing");
            }
            warn!(
                count = failed.len(),
                "Dropping failed txs from the pool"
            );
            self.tx_pool.delete_txs(hashes).await?;
        }

        if !opts.validate_only && !opts.flushing && processed.len() < config.min_txs_per_block {
            return Err(SequencerError::TooFewTxs {
                have: processed.len(),
                min: config.min_txs_per_block,
            });
        }

        let insertion_started = Instant::now();
        builder.add_txs(&processed).await?;
        self.metrics.record_tree_insertion(insertion_started.elapsed());

        let block = builder.set_block_completed().await?;
        debug!(
            block_number = %block.number(),
            num_txs = processed.len(),
            processor_ms = processor_duration.as_millis(),
            "Completed block build"
        );

        Ok((block, processor_duration, processed.len()))
    }

    /// Absolute wall-clock deadline handed to the processor, or `None` when
    /// the time table is not enforced
    fn processing_deadline(
        &self,
        table: &TimeTable,
        global_variables: GlobalVariables,
    ) -> Option<u64> {
        if !table.enforced() {
            return None;
        }
        let offset_secs = table.deadline(SequencerPhase::CreatingBlock) + table.process_tx_time();
        let slot_start_ms = self
            .constants
            .slot_start_unix_ms(global_variables.slot_number);
        Some(slot_start_ms.saturating_add((offset_secs * 1000.0) as u64))
    }
}

/// Release a fork after [`FORK_CLOSE_GRACE`], off the critical path.
///
/// Closing is best-effort; a failure leaves an unreferenced snapshot behind
/// and nothing else.
fn defer_fork_close<Fork>(fork: Fork)
where
    Fork: WorldStateFork,
{
    tokio::spawn(async move {
        tokio::time::sleep(FORK_CLOSE_GRACE).await;
        if let Err(error) = fork.close().await {
            warn!(%error, "Failed to close world state fork");
        }
    });
}
