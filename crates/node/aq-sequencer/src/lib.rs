//! Block-proposer sequencer loop of the Aqueduct rollup node.
//!
//! Once per polling tick the sequencer checks that local views caught up with
//! the L1 tip, asks the publisher whether this node is the elected proposer
//! for the current slot, assembles a block from the pending transaction pool
//! under the slot's time budget, collects a quorum of committee attestations,
//! publishes the block to the rollup contract and opportunistically claims
//! the right to prove a prior epoch.
//!
//! Four clocks meet here: L1 slot timing, the precomputed per-phase deadlines
//! of [`TimeTable`], cooperative scheduling around the long-running build,
//! and the rollback discipline of forked world state. A missed deadline
//! abandons the tick; any other failure unwinds it; either way the loop
//! returns to [`SequencerPhase::Idle`] and waits for the next tick.

mod assembler;
mod attestations;
mod config;
mod error;
mod metrics;
mod quotes;
mod state;
mod timetable;

pub use crate::config::{RollupConstants, SequencerConfig, SequencerConfigUpdate};
pub use crate::error::SequencerError;
pub use crate::metrics::SequencerMetrics;
pub use crate::state::SequencerPhase;
pub use crate::timetable::{TimeTable, TimetableError};

use crate::assembler::{BlockAssembler, BuildOptions};
use crate::state::StateMachine;
use aq_client_api::{
    BlockBuilderCallback, BlockBuilderFactory, Clock, GlobalVariableBuilder, L1ToL2MessageSource,
    L2BlockSource, PublicProcessorFactory, RollupPublisher, Slasher, TxPool, ValidatorClient,
    WorldState,
};
use aq_core_primitives::block::BlockHeader;
use aq_core_primitives::hashes::ArchiveRoot;
use aq_core_primitives::proposal::{EpochProofQuote, VoteKind};
use aq_core_primitives::slots::{BlockNumber, SlotNumber};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Collaborators and configuration for [`Sequencer`]
#[derive(Debug)]
pub struct SequencerOptions<P, V, TP, WS, PPF, BBF, LS, MS, GB, SL, C> {
    /// L1 publisher of the rollup contract
    pub publisher: P,
    /// Validator committee client; `None` on nodes without a validator key
    pub validator_client: Option<V>,
    /// Pending transaction pool
    pub tx_pool: TP,
    /// Authenticated world state database
    pub world_state: WS,
    /// Factory for public-function processors
    pub processor_factory: PPF,
    /// Factory for tree-insertion block builders
    pub builder_factory: BBF,
    /// Source of published L2 blocks
    pub l2_block_source: LS,
    /// Source of L1→L2 messages
    pub l1_to_l2_message_source: MS,
    /// Builder of per-block global variables
    pub global_variable_builder: GB,
    /// Producer of slashing vote payloads
    pub slasher: SL,
    /// Wall clock
    pub clock: C,
    /// Rollup timing constants
    pub constants: RollupConstants,
    /// Initial configuration
    pub config: SequencerConfig,
}

/// Snapshot the work loop reads once per tick; replaced atomically on
/// configuration updates
#[derive(Debug, Clone)]
struct ConfigSnapshot {
    config: Arc<SequencerConfig>,
    timetable: Arc<TimeTable>,
}

#[derive(Debug)]
struct RunningLoop {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

#[derive(Debug)]
struct Inner<P, V, TP, WS, PPF, BBF, LS, MS, GB, SL, C>
where
    WS: WorldState,
{
    publisher: P,
    validator_client: Option<V>,
    tx_pool: TP,
    world_state: WS,
    l2_block_source: LS,
    message_source: MS,
    global_variable_builder: GB,
    slasher: SL,
    clock: C,
    constants: RollupConstants,
    assembler: BlockAssembler<WS, PPF, BBF, MS, TP>,
    state: StateMachine,
    metrics: SequencerMetrics,
    snapshot: Arc<Mutex<ConfigSnapshot>>,
    flushing: AtomicBool,
    running: Mutex<Option<RunningLoop>>,
}

/// The block-proposer sequencer.
///
/// Cheap to clone; all clones share the same loop and state. Constructed
/// stopped, started with [`Sequencer::start()`].
#[derive(Debug)]
pub struct Sequencer<P, V, TP, WS, PPF, BBF, LS, MS, GB, SL, C>
where
    WS: WorldState,
{
    inner: Arc<Inner<P, V, TP, WS, PPF, BBF, LS, MS, GB, SL, C>>,
}

impl<P, V, TP, WS, PPF, BBF, LS, MS, GB, SL, C> Clone
    for Sequencer<P, V, TP, WS, PPF, BBF, LS, MS, GB, SL, C>
where
    WS: WorldState,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, V, TP, WS, PPF, BBF, LS, MS, GB, SL, C>
    Sequencer<P, V, TP, WS, PPF, BBF, LS, MS, GB, SL, C>
where
    P: RollupPublisher,
    V: ValidatorClient,
    TP: TxPool,
    WS: WorldState,
    PPF: PublicProcessorFactory<WS::Fork>,
    BBF: BlockBuilderFactory<WS::Fork>,
    LS: L2BlockSource,
    MS: L1ToL2MessageSource,
    GB: GlobalVariableBuilder,
    SL: Slasher,
    C: Clock,
{
    /// Create a stopped sequencer and register it with its collaborators.
    ///
    /// Fails when the initial configuration does not leave room for
    /// transaction processing within a slot.
    pub fn new(
        options: SequencerOptions<P, V, TP, WS, PPF, BBF, LS, MS, GB, SL, C>,
        registry: &mut Registry,
    ) -> Result<Self, SequencerError> {
        let SequencerOptions {
            publisher,
            validator_client,
            tx_pool,
            world_state,
            processor_factory,
            builder_factory,
            l2_block_source,
            l1_to_l2_message_source,
            global_variable_builder,
            slasher,
            clock,
            constants,
            config,
        } = options;

        let timetable = TimeTable::derive(&constants, &config)?;
        let metrics = SequencerMetrics::new(registry);
        let assembler = BlockAssembler::new(
            world_state.clone(),
            processor_factory,
            builder_factory,
            l1_to_l2_message_source.clone(),
            tx_pool.clone(),
            constants,
            metrics.clone(),
        );
        let snapshot = Arc::new(Mutex::new(ConfigSnapshot {
            config: Arc::new(config),
            timetable: Arc::new(timetable),
        }));

        let sequencer = Self {
            inner: Arc::new(Inner {
                publisher,
                validator_client,
                tx_pool,
                world_state,
                l2_block_source,
                message_source: l1_to_l2_message_source,
                global_variable_builder,
                slasher,
                clock,
                constants,
                assembler,
                state: StateMachine::new(constants),
                metrics,
                snapshot,
                flushing: AtomicBool::new(false),
                running: Mutex::new(None),
            }),
        };
        sequencer.register_with_collaborators();
        Ok(sequencer)
    }

    /// Start polling. No-op when already running.
    pub fn start(&self) {
        self.start_loop();
        self.force_phase(SequencerPhase::Idle);
        info!(
            sender = %self.inner.publisher.get_sender_address(),
            "Sequencer started"
        );
    }

    /// Stop the validator client, the polling loop and the slasher, interrupt
    /// in-flight publisher calls and park in [`SequencerPhase::Stopped`].
    ///
    /// Idempotent; a second call is a no-op.
    pub async fn stop(&self) {
        debug!("Stopping sequencer");

        if let Some(validator_client) = &self.inner.validator_client {
            validator_client.stop().await;
        }

        let running = self.inner.running.lock().take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            if let Err(error) = running.join.await {
                debug!(%error, "Sequencer loop ended abnormally");
            }
        }

        self.inner.slasher.stop().await;
        self.inner.publisher.interrupt();
        self.force_phase(SequencerPhase::Stopped);
        info!("Sequencer stopped");
    }

    /// Re-arm the publisher and resume polling after [`Sequencer::stop()`]
    pub fn restart(&self) {
        info!("Restarting sequencer");
        self.inner.publisher.restart();
        self.start_loop();
        self.force_phase(SequencerPhase::Idle);
    }

    /// Build the next block even when the pool holds fewer than the
    /// configured minimum of transactions. Consumed by the next built block.
    pub fn flush(&self) {
        debug!("Flush requested, next block builds regardless of pool size");
        self.inner.flushing.store(true, Ordering::Release);
    }

    /// Whether a flush is pending
    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.load(Ordering::Acquire)
    }

    /// Current phase of the pipeline
    pub fn status(&self) -> SequencerPhase {
        self.inner.state.current()
    }

    /// Apply every explicitly-set field of the update, forward the governance
    /// payload and slash-payload getter to the publisher, and recompute the
    /// deadline table.
    ///
    /// On failure the previous configuration and table stay active; an
    /// in-flight tick keeps the snapshot it started with either way.
    pub fn update_config(&self, update: SequencerConfigUpdate) -> Result<(), SequencerError> {
        let mut snapshot = self.inner.snapshot.lock();
        let merged = snapshot.config.merged_with(&update);
        // Derive before mutating anything so a bad update cannot rotate in
        let timetable = TimeTable::derive(&self.inner.constants, &merged)?;

        self.inner
            .publisher
            .set_governance_payload(merged.governance_proposer_payload.clone());
        let slasher = self.inner.slasher.clone();
        self.inner
            .publisher
            .register_slash_payload_getter(Arc::new(move || slasher.slash_payload()));

        snapshot.config = Arc::new(merged);
        snapshot.timetable = Arc::new(timetable);
        Ok(())
    }

    fn register_with_collaborators(&self) {
        let slasher = self.inner.slasher.clone();
        self.inner
            .publisher
            .register_slash_payload_getter(Arc::new(move || slasher.slash_payload()));

        let governance_payload = self
            .inner
            .snapshot
            .lock()
            .config
            .governance_proposer_payload
            .clone();
        self.inner.publisher.set_governance_payload(governance_payload);

        if let Some(validator_client) = &self.inner.validator_client {
            let assembler = self.inner.assembler.clone();
            let snapshot = Arc::clone(&self.inner.snapshot);
            let callback: BlockBuilderCallback =
                Arc::new(move |txs, global_variables, historical_header| {
                    let assembler = assembler.clone();
                    let (config, timetable) = {
                        let snapshot = snapshot.lock();
                        (snapshot.config.clone(), snapshot.timetable.clone())
                    };
                    async move {
                        let result = assembler
                            .build_block(
                                stream::iter(txs).boxed(),
                                global_variables,
                                historical_header,
                                &config,
                                &timetable,
                                BuildOptions {
                                    validate_only: true,
                                    flushing: false,
                                },
                            )
                            .await?;
                        Ok(result.block)
                    }
                    .boxed()
                });
            validator_client.register_block_builder(callback);
        }
    }

    fn start_loop(&self) {
        let mut running = self.inner.running.lock();
        if running.is_some() {
            debug!("Sequencer is already running");
            return;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.clone().run(shutdown_rx));
        *running = Some(RunningLoop { shutdown, join });
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let polling_interval = self.inner.snapshot.lock().config.polling_interval;
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(polling_interval) => {}
            }
            self.work().await;
        }
        trace!("Sequencer loop exited");
    }

    /// One tick of the work loop: run the pipeline, then return the phase to
    /// idle no matter how the pipeline ended.
    ///
    /// A missed deadline is a warning, not a failure: the slot is simply lost
    /// to a better-provisioned proposer. Everything else is an error of the
    /// tick.
    pub(crate) async fn work(&self) {
        let result = self.work_tick().await;

        self.force_phase(SequencerPhase::Idle);

        match result {
            Ok(()) => {}
            Err(error @ SequencerError::TooSlow { .. }) => {
                warn!(%error, "Sequencer ran past a slot deadline, abandoning the tick");
            }
            Err(error) => {
                error!(%error, "Sequencer tick failed");
            }
        }
    }

    async fn work_tick(&self) -> Result<(), SequencerError> {
        let (config, table) = self.config_snapshot();

        self.set_phase(&table, SequencerPhase::Synchronizing, SlotNumber::ZERO)?;
        if !self.is_synced().await? {
            debug!("Local views are behind the L1 tip, skipping this tick");
            return Ok(());
        }

        self.set_phase(&table, SequencerPhase::ProposerCheck, SlotNumber::ZERO)?;
        let tip = self.inner.l2_block_source.latest_block().await?;
        let (next_block_number, tip_archive, historical_header) = match &tip {
            Some(block) => (
                block.header.global_variables.block_number + BlockNumber::ONE,
                block.archive_root,
                Some(block.header),
            ),
            None => (BlockNumber::ONE, ArchiveRoot::GENESIS, None),
        };

        let slot = match self.may_propose_block(tip_archive, next_block_number).await {
            Ok(slot) => slot,
            Err(
                error @ (SequencerError::NotEligible { .. }
                | SequencerError::ProposerMismatch { .. }),
            ) => {
                debug!(%error, "Not the proposer this tick");
                return Ok(());
            }
            Err(error) => return Err(error),
        };
        debug!(%slot, %next_block_number, "Elected to propose");

        let global_variables = self
            .inner
            .global_variable_builder
            .build_global_variables(next_block_number, config.coinbase, config.fee_recipient, slot)
            .await?;

        self.cast_votes(slot);

        let pending_tx_count = self.inner.tx_pool.pending_tx_count().await?;
        let flushing = self.inner.flushing.load(Ordering::Acquire);
        if pending_tx_count < config.min_txs_per_block && !flushing {
            debug!(
                pending_tx_count,
                min_txs_per_block = config.min_txs_per_block,
                "Not enough pending txs to build, looking for a proof quote to claim"
            );
            return quotes::claim_proof_right(&self.inner.publisher, &self.inner.tx_pool, slot)
                .await;
        }

        self.set_phase(&table, SequencerPhase::InitializingProposal, slot)?;
        let proposal_header = BlockHeader::pre_build(tip_archive, global_variables);

        self.build_block_and_attempt_to_publish(
            &config,
            &table,
            proposal_header,
            historical_header,
            slot,
            flushing,
        )
        .await
    }

    /// Build, attest and publish one block.
    ///
    /// Must propagate every partial failure: the tick unwinds before any
    /// state outside the world-state forks is touched, and the forks
    /// themselves are discarded by the assembler on every exit path.
    async fn build_block_and_attempt_to_publish(
        &self,
        config: &Arc<SequencerConfig>,
        table: &Arc<TimeTable>,
        proposal_header: BlockHeader,
        historical_header: Option<BlockHeader>,
        slot: SlotNumber,
        flushing: bool,
    ) -> Result<(), SequencerError> {
        // The prior-epoch quote hunt runs concurrently with the build; its
        // handle is awaited before publication so the quote can be attached
        let mut quote_task = tokio::spawn({
            let publisher = self.inner.publisher.clone();
            let tx_pool = self.inner.tx_pool.clone();
            async move { quotes::collect_proof_quote(&publisher, &tx_pool, slot).await }
        });

        let result = self
            .build_attest_publish(
                config,
                table,
                proposal_header,
                historical_header,
                slot,
                flushing,
                &mut quote_task,
            )
            .await;

        match &result {
            Ok(()) => {}
            Err(SequencerError::TooSlow { .. }) => {
                // A timing abort is not a failed block
                quote_task.abort();
            }
            Err(_) => {
                quote_task.abort();
                self.inner.metrics.record_failed_block();
            }
        }
        result
    }

    #[expect(clippy::too_many_arguments, reason = "One call site, wired from the tick")]
    async fn build_attest_publish(
        &self,
        config: &Arc<SequencerConfig>,
        table: &Arc<TimeTable>,
        proposal_header: BlockHeader,
        historical_header: Option<BlockHeader>,
        slot: SlotNumber,
        flushing: bool,
        quote_task: &mut JoinHandle<Option<EpochProofQuote>>,
    ) -> Result<(), SequencerError> {
        self.inner
            .publisher
            .validate_block_for_submission(&proposal_header)
            .await
            .map_err(|error| SequencerError::PublisherRejected { error })?;

        self.set_phase(table, SequencerPhase::CreatingBlock, slot)?;
        let txs = self.inner.tx_pool.pending_txs().await?;
        let build = self
            .inner
            .assembler
            .build_block(
                txs,
                proposal_header.global_variables,
                historical_header,
                config,
                table,
                BuildOptions {
                    validate_only: false,
                    flushing,
                },
            )
            .await?;

        // The flush is consumed by the built block, whatever happens to it
        if flushing {
            self.inner.flushing.store(false, Ordering::Release);
        }

        let tx_hashes = build.block.tx_hashes();
        let attestations = attestations::collect_attestations(
            &self.inner.publisher,
            self.inner.validator_client.as_ref(),
            &self.inner.state,
            table,
            &self.inner.clock,
            &self.inner.metrics,
            &build.block,
            tx_hashes.clone(),
            slot,
        )
        .await?;

        let proof_quote = match quote_task.await {
            Ok(quote) => quote,
            Err(error) => {
                debug!(%error, "Quote collection did not finish");
                None
            }
        };

        self.set_phase(table, SequencerPhase::PublishingBlock, slot)?;
        // Second validation catches an L1 state change that happened while
        // the block was being built
        self.inner
            .publisher
            .validate_block_for_submission(&build.block.header)
            .await
            .map_err(|error| SequencerError::PublisherRejected { error })?;

        let published = self
            .inner
            .publisher
            .propose_l2_block(
                &build.block,
                attestations.as_deref().unwrap_or(&[]),
                &tx_hashes,
                proof_quote.as_ref(),
            )
            .await
            .map_err(|error| SequencerError::PublisherRejected { error })?;
        if !published {
            return Err(SequencerError::BlockNotPublished);
        }

        info!(
            block_number = %build.block.number(),
            %slot,
            num_txs = build.num_txs,
            num_msgs = build.num_msgs,
            attestations = attestations.as_ref().map_or(0, Vec::len),
            processor_ms = build.processor_duration.as_millis(),
            "Published block"
        );
        self.inner
            .metrics
            .record_published_block(build.build_started_at.elapsed());
        Ok(())
    }

    /// All local views must have caught up with the L1 tip before proposing
    /// on top of it
    async fn is_synced(&self) -> Result<bool, SequencerError> {
        let world_state = self.inner.world_state.status().await?;
        let tips = self.inner.l2_block_source.l2_tips().await?;

        if let Some(tip) = &tips.latest {
            if world_state.latest_synced_block_hash != tip.hash {
                trace!(
                    world_state_hash = %world_state.latest_synced_block_hash,
                    tip_hash = %tip.hash,
                    "World state is behind the tip"
                );
                return Ok(false);
            }
            let pool = self.inner.tx_pool.status().await?;
            if pool.synced_block_number < tip.number {
                return Ok(false);
            }
            let messages_synced_to = self.inner.message_source.block_number().await?;
            if messages_synced_to < tip.number {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Ask the publisher for proposal rights on top of the given archive.
    ///
    /// A permit for a different block number than the local tip implies
    /// that the contract and the local view disagree. Either outcome ends
    /// the tick quietly.
    async fn may_propose_block(
        &self,
        tip_archive: ArchiveRoot,
        expected_block_number: BlockNumber,
    ) -> Result<SlotNumber, SequencerError> {
        let permit = self
            .inner
            .publisher
            .can_propose_at_next_eth_block(tip_archive)
            .await
            .map_err(|error| SequencerError::NotEligible { error })?;

        if permit.block_number != expected_block_number {
            return Err(SequencerError::ProposerMismatch {
                expected: expected_block_number,
                actual: permit.block_number,
            });
        }
        Ok(permit.slot)
    }

    /// Governance and slashing votes ride along with every proposal
    /// opportunity; results are not awaited
    fn cast_votes(&self, slot: SlotNumber) {
        let timestamp = self.inner.clock.now_ms() / 1000;
        for kind in [VoteKind::Governance, VoteKind::Slashing] {
            let publisher = self.inner.publisher.clone();
            tokio::spawn(async move {
                if let Err(error) = publisher.cast_vote(slot, timestamp, kind).await {
                    debug!(%kind, %error, "Failed to cast vote");
                }
            });
        }
    }

    #[cfg(test)]
    pub(crate) fn metrics(&self) -> &SequencerMetrics {
        &self.inner.metrics
    }

    fn config_snapshot(&self) -> (Arc<SequencerConfig>, Arc<TimeTable>) {
        let snapshot = self.inner.snapshot.lock();
        (snapshot.config.clone(), snapshot.timetable.clone())
    }

    fn set_phase(
        &self,
        table: &TimeTable,
        phase: SequencerPhase,
        slot: SlotNumber,
    ) -> Result<(), SequencerError> {
        self.inner
            .state
            .set(table, &self.inner.clock, &self.inner.metrics, phase, slot)
    }

    fn force_phase(&self, phase: SequencerPhase) {
        let table = self.inner.snapshot.lock().timetable.clone();
        self.inner.state.force_set(
            &table,
            &self.inner.clock,
            &self.inner.metrics,
            phase,
            SlotNumber::ZERO,
        );
    }
}
