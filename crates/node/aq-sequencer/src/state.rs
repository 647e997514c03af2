//! Sequencer phase and the deadline-gated state machine.

use crate::config::RollupConstants;
use crate::error::SequencerError;
use crate::metrics::SequencerMetrics;
use crate::timetable::TimeTable;
use aq_client_api::Clock;
use aq_core_primitives::slots::SlotNumber;
use core::fmt;
use parking_lot::Mutex;
use tracing::trace;

/// Phase of the sequencer pipeline.
///
/// `Stopped` is terminal until restart; `Idle` is the resting state of a
/// running sequencer. The remaining phases trace one tick of the pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SequencerPhase {
    /// Not running
    Stopped,
    /// Running, waiting for the next tick
    Idle,
    /// Checking whether local views caught up with the L1 tip
    Synchronizing,
    /// Asking the publisher for proposal rights
    ProposerCheck,
    /// Setting up the proposal header
    InitializingProposal,
    /// Executing transactions and building the block
    CreatingBlock,
    /// Waiting for committee attestations
    CollectingAttestations,
    /// Submitting the block to the rollup contract
    PublishingBlock,
}

impl SequencerPhase {
    /// Stable lowercase name, used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Idle => "idle",
            Self::Synchronizing => "synchronizing",
            Self::ProposerCheck => "proposer-check",
            Self::InitializingProposal => "initializing-proposal",
            Self::CreatingBlock => "creating-block",
            Self::CollectingAttestations => "collecting-attestations",
            Self::PublishingBlock => "publishing-block",
        }
    }
}

impl fmt::Display for SequencerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holds the current phase and rejects forward transitions whose deadline has
/// already passed.
///
/// Only the loop driver mutates the phase, so transitions are totally
/// ordered; the lock exists for `status()` readers on other tasks.
#[derive(Debug)]
pub(crate) struct StateMachine {
    constants: RollupConstants,
    phase: Mutex<SequencerPhase>,
}

impl StateMachine {
    pub(crate) fn new(constants: RollupConstants) -> Self {
        Self {
            constants,
            phase: Mutex::new(SequencerPhase::Stopped),
        }
    }

    /// Current phase
    pub(crate) fn current(&self) -> SequencerPhase {
        *self.phase.lock()
    }

    /// Transition towards `to` within the given slot, subject to the deadline
    /// gate. Ignored while stopped.
    ///
    /// `SlotNumber::ZERO` bypasses the slot arithmetic by convention: callers
    /// pass it when transitioning to an unrestricted phase.
    pub(crate) fn set(
        &self,
        table: &TimeTable,
        clock: &impl Clock,
        metrics: &SequencerMetrics,
        to: SequencerPhase,
        slot: SlotNumber,
    ) -> Result<(), SequencerError> {
        self.transition(table, clock, metrics, to, slot, false)
    }

    /// Transition unconditionally, also out of `Stopped`
    pub(crate) fn force_set(
        &self,
        table: &TimeTable,
        clock: &impl Clock,
        metrics: &SequencerMetrics,
        to: SequencerPhase,
        slot: SlotNumber,
    ) {
        // The forced path never fails: the deadline gate only applies to
        // restricted phases and forced transitions target unrestricted ones
        let _ = self.transition(table, clock, metrics, to, slot, true);
    }

    fn transition(
        &self,
        table: &TimeTable,
        clock: &impl Clock,
        metrics: &SequencerMetrics,
        to: SequencerPhase,
        slot: SlotNumber,
        forced: bool,
    ) -> Result<(), SequencerError> {
        let mut phase = self.phase.lock();

        if *phase == SequencerPhase::Stopped && !forced {
            trace!(to = %to, "Ignoring transition, sequencer is stopped");
            return Ok(());
        }

        if slot != SlotNumber::ZERO {
            let seconds_into_slot = self.constants.seconds_into_slot(slot, clock.now_ms());
            let deadline = table.deadline(to);

            if table.enforced() && table.is_restricted(to) && seconds_into_slot > deadline {
                return Err(SequencerError::TooSlow {
                    from: *phase,
                    to,
                    deadline,
                    seconds_into_slot,
                });
            }

            if table.is_restricted(to) {
                metrics.record_state_transition_buffer(to, (deadline - seconds_into_slot) * 1000.0);
            }

            trace!(from = %*phase, to = %to, %slot, seconds_into_slot, "Phase transition");
        } else {
            trace!(from = %*phase, to = %to, "Phase transition");
        }

        *phase = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SequencerConfig;
    use prometheus_client::registry::Registry;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Clone)]
    struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        fn at_unix_secs(secs: u64) -> Self {
            Self(Arc::new(AtomicU64::new(secs * 1000)))
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    const GENESIS: u64 = 1_700_000_000;

    fn constants() -> RollupConstants {
        RollupConstants {
            slot_duration: 24,
            ethereum_slot_duration: 12,
            l1_genesis_time: GENESIS,
        }
    }

    fn table(enforce: bool) -> TimeTable {
        let config = SequencerConfig {
            enforce_time_table: enforce,
            max_l1_tx_inclusion_time_into_slot: 4,
            ..SequencerConfig::default()
        };
        TimeTable::derive(&constants(), &config).unwrap()
    }

    fn metrics() -> SequencerMetrics {
        SequencerMetrics::new(&mut Registry::default())
    }

    #[test]
    fn ignores_transitions_while_stopped() {
        let machine = StateMachine::new(constants());
        let clock = ManualClock::at_unix_secs(GENESIS);

        machine
            .set(&table(true), &clock, &metrics(), SequencerPhase::Idle, SlotNumber::ZERO)
            .unwrap();
        assert_eq!(machine.current(), SequencerPhase::Stopped);

        machine.force_set(
            &table(true),
            &clock,
            &metrics(),
            SequencerPhase::Idle,
            SlotNumber::ZERO,
        );
        assert_eq!(machine.current(), SequencerPhase::Idle);
    }

    #[test]
    fn rejects_missed_deadline() {
        let machine = StateMachine::new(constants());
        let metrics = metrics();
        // Slot 1 starts at GENESIS+24; CreatingBlock deadline is 3s in
        let clock = ManualClock::at_unix_secs(GENESIS + 24 + 5);
        let slot = SlotNumber::ONE;

        machine.force_set(&table(true), &clock, &metrics, SequencerPhase::Idle, SlotNumber::ZERO);

        let error = machine
            .set(&table(true), &clock, &metrics, SequencerPhase::CreatingBlock, slot)
            .unwrap_err();
        match error {
            SequencerError::TooSlow {
                deadline,
                seconds_into_slot,
                ..
            } => {
                assert_eq!(deadline, 3.0);
                assert_eq!(seconds_into_slot, 5.0);
            }
            other => panic!("Unexpected error: {other}"),
        }
        // Phase is unchanged after a rejected transition
        assert_eq!(machine.current(), SequencerPhase::Idle);
    }

    #[test]
    fn accepts_transition_before_deadline() {
        let machine = StateMachine::new(constants());
        let metrics = metrics();
        let clock = ManualClock::at_unix_secs(GENESIS + 24 + 2);

        machine.force_set(&table(true), &clock, &metrics, SequencerPhase::Idle, SlotNumber::ZERO);
        machine
            .set(
                &table(true),
                &clock,
                &metrics,
                SequencerPhase::CreatingBlock,
                SlotNumber::ONE,
            )
            .unwrap();
        assert_eq!(machine.current(), SequencerPhase::CreatingBlock);
    }

    #[test]
    fn missed_deadline_tolerated_when_not_enforced() {
        let machine = StateMachine::new(constants());
        let metrics = metrics();
        let clock = ManualClock::at_unix_secs(GENESIS + 24 + 20);

        machine.force_set(&table(false), &clock, &metrics, SequencerPhase::Idle, SlotNumber::ZERO);
        machine
            .set(
                &table(false),
                &clock,
                &metrics,
                SequencerPhase::CreatingBlock,
                SlotNumber::ONE,
            )
            .unwrap();
        assert_eq!(machine.current(), SequencerPhase::CreatingBlock);
    }

    #[test]
    fn zero_slot_bypasses_deadline_arithmetic() {
        let machine = StateMachine::new(constants());
        let metrics = metrics();
        // A timestamp far past slot 0; would fail any restricted deadline
        let clock = ManualClock::at_unix_secs(GENESIS + 1000);

        machine.force_set(&table(true), &clock, &metrics, SequencerPhase::Idle, SlotNumber::ZERO);
        machine
            .set(
                &table(true),
                &clock,
                &metrics,
                SequencerPhase::Synchronizing,
                SlotNumber::ZERO,
            )
            .unwrap();
        assert_eq!(machine.current(), SequencerPhase::Synchronizing);
    }
}
