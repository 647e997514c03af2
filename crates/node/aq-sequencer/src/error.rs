//! Error taxonomy of the sequencer loop.

use crate::state::SequencerPhase;
use crate::timetable::TimetableError;
use aq_client_api::{
    BlockSourceError, BuilderError, GlobalVariablesError, ProcessorError, PublisherError,
    TxPoolError, ValidatorClientError, WorldStateError,
};
use aq_core_primitives::slots::{BlockNumber, EpochNumber};

/// Error for the sequencer pipeline.
///
/// The work loop classifies these: [`SequencerError::TooSlow`] is a warning
/// (a timing abort, not a failure), eligibility variants end the tick at
/// debug level, and everything else is an error of the tick. In every case
/// the loop returns the phase to idle.
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    /// A phase deadline was missed; the tick is abandoned
    #[error(
        "Too slow to transition from {from} to {to}: {seconds_into_slot}s into the slot, \
        deadline is {deadline}s"
    )]
    TooSlow {
        /// Phase the sequencer was in
        from: SequencerPhase,
        /// Phase that missed its deadline
        to: SequencerPhase,
        /// Latest allowed start of the target phase, seconds into the slot
        deadline: f64,
        /// Observed wall-clock seconds into the slot
        seconds_into_slot: f64,
    },
    /// The publisher did not grant proposal rights for this slot
    #[error("Not eligible to propose: {error}")]
    NotEligible {
        /// Underlying publisher response
        #[source]
        error: PublisherError,
    },
    /// The contract expects a different block than the local tip implies
    #[error("Proposer mismatch: building block {expected} but contract expects {actual}")]
    ProposerMismatch {
        /// Block number derived from the local tip
        expected: BlockNumber,
        /// Block number the contract expects next
        actual: BlockNumber,
    },
    /// Not enough processed transactions to justify a block
    #[error("Built a block with {have} txs, minimum is {min}")]
    TooFewTxs {
        /// Transactions that survived processing
        have: usize,
        /// Configured minimum
        min: usize,
    },
    /// Attestations are required but no validator client is registered
    #[error("Validator client is required to collect attestations but none is registered")]
    NoValidator,
    /// Deadline derivation failed during a configuration update
    #[error("Invalid timing configuration: {error}")]
    Config {
        /// Derivation error
        #[from]
        error: TimetableError,
    },
    /// The publisher rejected the block header before or after the build
    #[error("Publisher rejected the block: {error}")]
    PublisherRejected {
        /// Rejection as reported by the publisher
        #[source]
        error: PublisherError,
    },
    /// The publish transaction went out but the block did not land
    #[error("Block was submitted but not published")]
    BlockNotPublished,
    /// An epoch proof right claim did not land
    #[error("Failed to claim epoch proof right for epoch {epoch}: {reason}")]
    ClaimFailed {
        /// Epoch the claim was for
        epoch: EpochNumber,
        /// Why the claim failed
        reason: String,
    },
    /// Publisher failure outside the eligibility and submission paths
    #[error(transparent)]
    Publisher(#[from] PublisherError),
    /// Validator client failure
    #[error(transparent)]
    ValidatorClient(#[from] ValidatorClientError),
    /// Transaction pool failure
    #[error(transparent)]
    TxPool(#[from] TxPoolError),
    /// World state failure
    #[error(transparent)]
    WorldState(#[from] WorldStateError),
    /// Block or message source failure
    #[error(transparent)]
    BlockSource(#[from] BlockSourceError),
    /// Public processor failure
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    /// Block builder failure
    #[error(transparent)]
    Builder(#[from] BuilderError),
    /// Global variable builder failure
    #[error(transparent)]
    GlobalVariables(#[from] GlobalVariablesError),
}
