//! Per-phase deadline offsets within a slot.
//!
//! Every restricted phase of the pipeline gets a precomputed "latest allowed
//! start" measured in seconds from slot start. The offsets split the slot
//! between the fixed allowances (proposer wake-up, build setup, attestation
//! propagation both ways, block validation, L1 publishing) and the time left
//! for actually executing transactions, which the sequencer and the
//! validators each need once.

use crate::config::{RollupConstants, SequencerConfig};
use crate::state::SequencerPhase;

/// Latest start of proposer work, seconds into the slot
const INITIAL_TIME: f64 = 2.0;
/// Pre-build setup allowance in seconds
const BLOCK_PREPARE_TIME: f64 = 1.0;
/// One-way attestation propagation allowance in seconds; counted twice
const ATTESTATION_PROPAGATION_TIME: f64 = 2.0;
/// Block re-execution allowance on the validator side in seconds
const BLOCK_VALIDATION_TIME: f64 = 1.0;

/// Error for [`TimeTable::derive()`]
#[derive(Debug, thiserror::Error)]
#[error(
    "Fixed slot allowances leave {remaining_time_in_slot}s of a {slot_duration}s slot for \
    processing transactions"
)]
pub struct TimetableError {
    /// Configured slot duration in seconds
    pub slot_duration: f64,
    /// Seconds left for tx processing after all fixed allowances; negative
    pub remaining_time_in_slot: f64,
}

/// Deadlines of the sequencer pipeline, derived from slot timing.
///
/// Immutable between configuration updates; recomputed atomically on every
/// update so an in-flight tick keeps its snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeTable {
    slot_duration: f64,
    process_tx_time: f64,
    enforced: bool,
    initializing_proposal: f64,
    creating_block: f64,
    collecting_attestations: f64,
    publishing_block: f64,
}

impl TimeTable {
    /// Derive the table from rollup constants and sequencer configuration.
    ///
    /// Fails when deadlines are enforced but the fixed allowances do not fit
    /// into the slot.
    pub fn derive(
        constants: &RollupConstants,
        config: &SequencerConfig,
    ) -> Result<Self, TimetableError> {
        let slot_duration = constants.slot_duration as f64;
        let l1_publishing_time = constants.ethereum_slot_duration as f64
            - config.max_l1_tx_inclusion_time_into_slot as f64;

        let remaining_time_in_slot = slot_duration
            - INITIAL_TIME
            - BLOCK_PREPARE_TIME
            - l1_publishing_time
            - 2.0 * ATTESTATION_PROPAGATION_TIME
            - BLOCK_VALIDATION_TIME;
        if config.enforce_time_table && remaining_time_in_slot < 0.0 {
            return Err(TimetableError {
                slot_duration,
                remaining_time_in_slot,
            });
        }

        // Sequencer and validators each process the txs once
        let process_tx_time = remaining_time_in_slot / 2.0;

        Ok(Self {
            slot_duration,
            process_tx_time,
            enforced: config.enforce_time_table,
            initializing_proposal: INITIAL_TIME,
            creating_block: INITIAL_TIME + BLOCK_PREPARE_TIME,
            collecting_attestations: INITIAL_TIME
                + BLOCK_PREPARE_TIME
                + process_tx_time
                + BLOCK_VALIDATION_TIME,
            publishing_block: slot_duration - l1_publishing_time,
        })
    }

    /// Latest allowed start of the given phase, seconds into the slot.
    ///
    /// Unrestricted phases return the full slot duration so the deadline gate
    /// always passes.
    pub fn deadline(&self, phase: SequencerPhase) -> f64 {
        match phase {
            SequencerPhase::Stopped
            | SequencerPhase::Idle
            | SequencerPhase::Synchronizing
            | SequencerPhase::ProposerCheck => self.slot_duration,
            SequencerPhase::InitializingProposal => self.initializing_proposal,
            SequencerPhase::CreatingBlock => self.creating_block,
            SequencerPhase::CollectingAttestations => self.collecting_attestations,
            SequencerPhase::PublishingBlock => self.publishing_block,
        }
    }

    /// Whether entering the given phase is subject to the deadline gate
    pub fn is_restricted(&self, phase: SequencerPhase) -> bool {
        self.deadline(phase) < self.slot_duration
    }

    /// Seconds budgeted for executing transactions during the build
    pub fn process_tx_time(&self) -> f64 {
        self.process_tx_time
    }

    /// Whether deadlines are enforced at all
    pub fn enforced(&self) -> bool {
        self.enforced
    }

    /// Configured slot duration in seconds
    pub fn slot_duration(&self) -> f64 {
        self.slot_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constants() -> RollupConstants {
        RollupConstants {
            slot_duration: 24,
            ethereum_slot_duration: 12,
            l1_genesis_time: 1_700_000_000,
        }
    }

    fn config() -> SequencerConfig {
        SequencerConfig {
            enforce_time_table: true,
            max_l1_tx_inclusion_time_into_slot: 4,
            ..SequencerConfig::default()
        }
    }

    #[test]
    fn derives_documented_offsets() {
        // S=24, E=12, M=4: l1 publishing 8s, remaining 24-2-1-8-4-1 = 8s,
        // process_tx_time 4s
        let table = TimeTable::derive(&constants(), &config()).unwrap();

        assert_eq!(table.process_tx_time(), 4.0);
        assert_eq!(table.deadline(SequencerPhase::InitializingProposal), 2.0);
        assert_eq!(table.deadline(SequencerPhase::CreatingBlock), 3.0);
        assert_eq!(table.deadline(SequencerPhase::CollectingAttestations), 8.0);
        assert_eq!(table.deadline(SequencerPhase::PublishingBlock), 16.0);
    }

    #[test]
    fn unrestricted_phases_get_full_slot() {
        let table = TimeTable::derive(&constants(), &config()).unwrap();

        for phase in [
            SequencerPhase::Stopped,
            SequencerPhase::Idle,
            SequencerPhase::Synchronizing,
            SequencerPhase::ProposerCheck,
        ] {
            assert_eq!(table.deadline(phase), 24.0);
            assert!(!table.is_restricted(phase));
        }
        assert!(table.is_restricted(SequencerPhase::CreatingBlock));
    }

    #[test]
    fn rejects_slot_too_short_for_allowances() {
        let constants = RollupConstants {
            slot_duration: 12,
            ..constants()
        };

        // 12 - 2 - 1 - 8 - 4 - 1 = -4
        let error = TimeTable::derive(&constants, &config()).unwrap_err();
        assert_eq!(error.remaining_time_in_slot, -4.0);
    }

    #[test]
    fn short_slot_accepted_when_not_enforced() {
        let constants = RollupConstants {
            slot_duration: 12,
            ..constants()
        };
        let config = SequencerConfig {
            enforce_time_table: false,
            ..config()
        };

        let table = TimeTable::derive(&constants, &config).unwrap();
        assert!(!table.enforced());
    }
}
