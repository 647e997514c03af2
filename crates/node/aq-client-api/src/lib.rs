//! Collaborator interfaces consumed by the Aqueduct sequencer.
//!
//! Every external system the sequencer talks to — the L1 publisher, the
//! validator client, the transaction pool, the world state, block and message
//! sources, the public processor and block builder factories — is a trait
//! here with exactly the surface the sequencer needs. A test double supplies
//! the same surface; no concrete type leaks into the sequencer.

use aq_core_primitives::address::EthAddress;
use aq_core_primitives::block::{BlockHeader, GlobalVariables, L2Block};
use aq_core_primitives::hashes::{ArchiveRoot, Digest, TxHash};
use aq_core_primitives::proposal::{Attestation, BlockProposal, EpochProofQuote, VoteKind};
use aq_core_primitives::slots::{BlockNumber, EpochNumber, SlotNumber};
use aq_core_primitives::tx::{FailedTx, ProcessedTx, Tx};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Error for [`RollupPublisher`]
#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    /// The rollup contract rejected the header
    #[error("Rollup contract rejected the header: {reason}")]
    HeaderRejected {
        /// Rejection reason as reported by the contract
        reason: String,
    },
    /// Custom publisher error
    #[error("Custom publisher error: {error}")]
    Custom {
        // Underlying RPC or signing error
        #[from]
        error: anyhow::Error,
    },
}

/// Error for [`ValidatorClient`]
#[derive(Debug, thiserror::Error)]
pub enum ValidatorClientError {
    /// Not enough attestations arrived before the collection deadline
    #[error("Collected {collected} attestations, needed {needed}")]
    NotEnoughAttestations {
        /// Attestations received
        collected: usize,
        /// Quorum threshold
        needed: usize,
    },
    /// Custom validator client error
    #[error("Custom validator client error: {error}")]
    Custom {
        // Underlying p2p error
        #[from]
        error: anyhow::Error,
    },
}

/// Error for [`TxPool`]
#[derive(Debug, thiserror::Error)]
#[error("Tx pool error: {error}")]
pub struct TxPoolError {
    // Underlying pool error
    #[from]
    pub error: anyhow::Error,
}

/// Error for [`WorldState`] and [`WorldStateFork`]
#[derive(Debug, thiserror::Error)]
pub enum WorldStateError {
    /// The database has not caught up to the requested block
    #[error("World state is synced to {synced}, requested {requested}")]
    NotSynced {
        /// Latest block the database has applied
        synced: BlockNumber,
        /// Block that was requested
        requested: BlockNumber,
    },
    /// Custom world state error
    #[error("Custom world state error: {error}")]
    Custom {
        // Underlying database error
        #[from]
        error: anyhow::Error,
    },
}

/// Error for [`L2BlockSource`] and [`L1ToL2MessageSource`]
#[derive(Debug, thiserror::Error)]
#[error("Block source error: {error}")]
pub struct BlockSourceError {
    // Underlying source error
    #[from]
    pub error: anyhow::Error,
}

/// Error for [`PublicProcessor`]
#[derive(Debug, thiserror::Error)]
#[error("Public processor error: {error}")]
pub struct ProcessorError {
    // Underlying execution error
    #[from]
    pub error: anyhow::Error,
}

/// Error for [`RollupBlockBuilder`]
#[derive(Debug, thiserror::Error)]
#[error("Block builder error: {error}")]
pub struct BuilderError {
    // Underlying tree insertion error
    #[from]
    pub error: anyhow::Error,
}

/// Error for [`GlobalVariableBuilder`]
#[derive(Debug, thiserror::Error)]
#[error("Global variable builder error: {error}")]
pub struct GlobalVariablesError {
    // Underlying L1 query error
    #[from]
    pub error: anyhow::Error,
}

/// Permission to propose, as granted by the rollup contract
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProposalPermit {
    /// Slot assigned to this proposer
    pub slot: SlotNumber,
    /// Block number the contract expects next
    pub block_number: BlockNumber,
}

/// Getter the publisher invokes when assembling a slashing vote payload
pub type SlashPayloadGetter = Arc<dyn Fn() -> Option<Vec<u8>> + Send + Sync>;

/// L1 publisher of the rollup contract.
///
/// Owns transaction signing, gas and nonces; the sequencer only asks
/// questions and hands over finished blocks.
pub trait RollupPublisher: Clone + Send + Sync + 'static {
    /// Whether this node may propose on top of the given archive root at the
    /// next L1 block, and if so for which slot and block number
    fn can_propose_at_next_eth_block(
        &self,
        tip_archive: ArchiveRoot,
    ) -> impl Future<Output = Result<ProposalPermit, PublisherError>> + Send;

    /// Validate a header against the current L1 view.
    ///
    /// Called twice per block: on the pre-build proposal header and on the
    /// final header, so a concurrent L1 state change is caught before the
    /// publish transaction is sent.
    fn validate_block_for_submission(
        &self,
        header: &BlockHeader,
    ) -> impl Future<Output = Result<(), PublisherError>> + Send;

    /// Publish a block, optionally with attestations and an epoch proof
    /// quote. Returns whether the block landed.
    fn propose_l2_block(
        &self,
        block: &L2Block,
        attestations: &[Attestation],
        tx_hashes: &[TxHash],
        proof_quote: Option<&EpochProofQuote>,
    ) -> impl Future<Output = Result<bool, PublisherError>> + Send;

    /// Validator committee of the current epoch, in contract order
    fn get_current_epoch_committee(
        &self,
    ) -> impl Future<Output = Result<Vec<EthAddress>, PublisherError>> + Send;

    /// Epoch whose proof right can currently be claimed, if any
    fn get_claimable_epoch(
        &self,
    ) -> impl Future<Output = Result<Option<EpochNumber>, PublisherError>> + Send;

    /// Check a quote against the contract; returns it back when usable
    fn validate_proof_quote(
        &self,
        quote: &EpochProofQuote,
    ) -> impl Future<Output = Result<Option<EpochProofQuote>, PublisherError>> + Send;

    /// Claim the epoch proof right with the given quote, outside of a block
    /// proposal. Returns whether the claim landed.
    fn claim_epoch_proof_right(
        &self,
        quote: &EpochProofQuote,
    ) -> impl Future<Output = Result<bool, PublisherError>> + Send;

    /// Cast a governance or slashing vote for the given slot
    fn cast_vote(
        &self,
        slot: SlotNumber,
        timestamp: u64,
        kind: VoteKind,
    ) -> impl Future<Output = Result<(), PublisherError>> + Send;

    /// Register the getter used to produce slashing vote payloads
    fn register_slash_payload_getter(&self, getter: SlashPayloadGetter);

    /// Set the payload attached to governance votes
    fn set_governance_payload(&self, payload: Option<Vec<u8>>);

    /// L1 address this publisher signs with
    fn get_sender_address(&self) -> EthAddress;

    /// Abort in-flight L1 calls; used on sequencer stop
    fn interrupt(&self);

    /// Re-arm the publisher after [`RollupPublisher::interrupt()`]
    fn restart(&self);
}

/// Re-execution callback a validator client uses to check proposals it
/// receives from other proposers
pub type BlockBuilderCallback = Arc<
    dyn Fn(Vec<Tx>, GlobalVariables, Option<BlockHeader>) -> BoxFuture<'static, anyhow::Result<L2Block>>
        + Send
        + Sync,
>;

/// Validator committee client on the p2p layer
pub trait ValidatorClient: Clone + Send + Sync + 'static {
    /// Produce a signed proposal for the given block; `None` when this node
    /// has no registered validator key
    fn create_block_proposal(
        &self,
        header: BlockHeader,
        archive_root: ArchiveRoot,
        tx_hashes: Vec<TxHash>,
    ) -> impl Future<Output = Option<BlockProposal>> + Send;

    /// Broadcast a proposal to the committee
    fn broadcast_block_proposal(
        &self,
        proposal: BlockProposal,
    ) -> impl Future<Output = ()> + Send;

    /// Wait until at least `threshold` attestations over the proposal have
    /// arrived. Order of the result is arrival order, not committee order.
    fn collect_attestations(
        &self,
        proposal: &BlockProposal,
        threshold: usize,
    ) -> impl Future<Output = Result<Vec<Attestation>, ValidatorClientError>> + Send;

    /// Register the callback used to re-execute foreign proposals
    fn register_block_builder(&self, builder: BlockBuilderCallback);

    /// Stop the client
    fn stop(&self) -> impl Future<Output = ()> + Send;
}

/// Pool sync status
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TxPoolStatus {
    /// Latest L2 block the pool has processed
    pub synced_block_number: BlockNumber,
}

/// Pending transaction pool on the p2p layer
pub trait TxPool: Clone + Send + Sync + 'static {
    /// Number of pending transactions
    fn pending_tx_count(&self) -> impl Future<Output = Result<usize, TxPoolError>> + Send;

    /// Lazily iterate pending transactions, best fee first.
    ///
    /// Iteration is safe against concurrent additions; the stream is a
    /// snapshot cursor, not a lock.
    fn pending_txs(&self) -> impl Future<Output = Result<BoxStream<'static, Tx>, TxPoolError>> + Send;

    /// Drop transactions from the pool by hash
    fn delete_txs(&self, hashes: Vec<TxHash>) -> impl Future<Output = Result<(), TxPoolError>> + Send;

    /// Proof quotes gossiped for the given epoch
    fn epoch_proof_quotes(
        &self,
        epoch: EpochNumber,
    ) -> impl Future<Output = Result<Vec<EpochProofQuote>, TxPoolError>> + Send;

    /// Pool sync status
    fn status(&self) -> impl Future<Output = Result<TxPoolStatus, TxPoolError>> + Send;
}

/// World state sync status
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct WorldStateStatus {
    /// Latest block applied to the canonical trees
    pub latest_synced_block_number: BlockNumber,
    /// Hash of the latest applied block
    pub latest_synced_block_hash: Digest,
}

/// Handle to a forked world state.
///
/// A fork is a copy-on-write snapshot: mutations through the fork never reach
/// the canonical trees, and closing (or dropping every handle of) the fork
/// discards them. This is the rollback mechanism block building relies on.
pub trait WorldStateFork: Clone + Send + Sync + 'static {
    /// Release the fork and discard its mutations. Best-effort; an error
    /// leaves nothing worse than an unreferenced snapshot behind.
    fn close(&self) -> impl Future<Output = Result<(), WorldStateError>> + Send;
}

/// Authenticated world state database
pub trait WorldState: Clone + Send + Sync + 'static {
    /// Fork handle type
    type Fork: WorldStateFork;

    /// Current sync status
    fn status(&self) -> impl Future<Output = Result<WorldStateStatus, WorldStateError>> + Send;

    /// Block until the canonical trees have applied the given block
    fn sync_immediate(
        &self,
        block_number: BlockNumber,
    ) -> impl Future<Output = Result<(), WorldStateError>> + Send;

    /// Fork the state at the current tip
    fn fork(&self) -> impl Future<Output = Result<Self::Fork, WorldStateError>> + Send;
}

/// A block as seen by the L2 block source
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PublishedBlock {
    /// Header of the block
    pub header: BlockHeader,
    /// Archive root after the block
    pub archive_root: ArchiveRoot,
    /// Hash of the block
    pub hash: Digest,
}

/// Chain tip summary
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct L2Tips {
    /// Latest known block, `None` before genesis
    pub latest: Option<TipInfo>,
}

/// One entry of [`L2Tips`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TipInfo {
    /// Block number of the tip
    pub number: BlockNumber,
    /// Hash of the tip block
    pub hash: Digest,
}

/// Source of published L2 blocks (the archiver)
pub trait L2BlockSource: Clone + Send + Sync + 'static {
    /// Latest published block, `None` before genesis
    fn latest_block(
        &self,
    ) -> impl Future<Output = Result<Option<PublishedBlock>, BlockSourceError>> + Send;

    /// Number of the latest published block
    fn latest_block_number(
        &self,
    ) -> impl Future<Output = Result<BlockNumber, BlockSourceError>> + Send;

    /// Chain tip summary
    fn l2_tips(&self) -> impl Future<Output = Result<L2Tips, BlockSourceError>> + Send;
}

/// Source of L1→L2 messages to be consumed by new blocks
pub trait L1ToL2MessageSource: Clone + Send + Sync + 'static {
    /// Message batch that must be included in the given block
    fn l1_to_l2_messages(
        &self,
        block_number: BlockNumber,
    ) -> impl Future<Output = Result<Vec<Digest>, BlockSourceError>> + Send;

    /// Latest L1 block the source has processed messages up to
    fn block_number(&self) -> impl Future<Output = Result<BlockNumber, BlockSourceError>> + Send;
}

/// Limits handed to the public processor for one block
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct ProcessLimits {
    /// Absolute wall-clock deadline (unix milliseconds); the processor stops
    /// mid-batch when it passes
    pub deadline_unix_ms: Option<u64>,
    /// Maximum transactions to include
    pub max_transactions: usize,
    /// Maximum total serialized tx size in bytes
    pub max_block_size_in_bytes: u64,
}

/// Validation policy forwarded from sequencer configuration to tx validators
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct TxValidationPolicy {
    /// Contracts that may be called during the tx setup phase
    pub allowed_in_setup: Vec<Digest>,
    /// Whether fee payment is mandatory
    pub enforce_fees: bool,
}

/// Public-function processor, scoped to a single block build
pub trait PublicProcessor: Send {
    /// Execute public functions of the given transactions until limits are
    /// hit, returning successfully processed and failed transactions
    fn process(
        &mut self,
        txs: BoxStream<'_, Tx>,
        limits: ProcessLimits,
        policy: &TxValidationPolicy,
    ) -> impl Future<Output = Result<(Vec<ProcessedTx>, Vec<FailedTx>), ProcessorError>> + Send;
}

/// Factory creating a [`PublicProcessor`] over a world-state fork
pub trait PublicProcessorFactory<Fork>: Clone + Send + Sync + 'static
where
    Fork: WorldStateFork,
{
    /// Processor type
    type Processor: PublicProcessor;

    /// Create a processor executing on the given fork.
    ///
    /// With `enable_tracing` the processor records full execution traces so
    /// failed transactions carry a usable reason.
    fn create(
        &self,
        fork: Fork,
        historical_header: Option<BlockHeader>,
        global_variables: GlobalVariables,
        enable_tracing: bool,
    ) -> Self::Processor;
}

/// Tree-insertion block builder, scoped to a single block build
pub trait RollupBlockBuilder: Send {
    /// Begin a block with the given globals and L1→L2 message batch
    fn start_new_block(
        &mut self,
        global_variables: GlobalVariables,
        l1_to_l2_messages: Vec<Digest>,
    ) -> impl Future<Output = Result<(), BuilderError>> + Send;

    /// Insert processed transactions into the trees
    fn add_txs(&mut self, txs: &[ProcessedTx]) -> impl Future<Output = Result<(), BuilderError>> + Send;

    /// Pad and finish the block, returning it
    fn set_block_completed(&mut self) -> impl Future<Output = Result<L2Block, BuilderError>> + Send;
}

/// Factory creating a [`RollupBlockBuilder`] over a world-state fork
pub trait BlockBuilderFactory<Fork>: Clone + Send + Sync + 'static
where
    Fork: WorldStateFork,
{
    /// Builder type
    type Builder: RollupBlockBuilder;

    /// Create a builder inserting into the given fork
    fn create(&self, fork: Fork) -> Self::Builder;
}

/// Builder of per-block global variables
pub trait GlobalVariableBuilder: Clone + Send + Sync + 'static {
    /// Derive the globals for the given block and slot
    fn build_global_variables(
        &self,
        block_number: BlockNumber,
        coinbase: EthAddress,
        fee_recipient: EthAddress,
        slot: SlotNumber,
    ) -> impl Future<Output = Result<GlobalVariables, GlobalVariablesError>> + Send;
}

/// Producer of slashing vote payloads
pub trait Slasher: Clone + Send + Sync + 'static {
    /// Current slashing payload, if any offense was observed
    fn slash_payload(&self) -> Option<Vec<u8>>;

    /// Stop the slasher
    fn stop(&self) -> impl Future<Output = ()> + Send;
}

/// Wall clock.
///
/// All sequencer timing goes through this trait so tests can simulate slot
/// boundaries without sleeping.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Current unix time in milliseconds
    fn now_ms(&self) -> u64;
}

/// [`Clock`] backed by the system time
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}
