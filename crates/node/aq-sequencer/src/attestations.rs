//! Attestation collection from the validator committee.

use crate::error::SequencerError;
use crate::metrics::SequencerMetrics;
use crate::state::{SequencerPhase, StateMachine};
use crate::timetable::TimeTable;
use aq_client_api::{Clock, RollupPublisher, ValidatorClient};
use aq_core_primitives::address::EthAddress;
use aq_core_primitives::block::L2Block;
use aq_core_primitives::hashes::TxHash;
use aq_core_primitives::proposal::Attestation;
use aq_core_primitives::slots::SlotNumber;
use std::time::Instant;
use tracing::{debug, warn};

/// Quorum threshold for a committee of the given size
pub(crate) fn attestation_threshold(committee_size: usize) -> usize {
    committee_size * 2 / 3 + 1
}

/// Collect a quorum of attestations over the freshly built block.
///
/// Returns `None` when the committee is empty, in which case publication
/// proceeds without attestations. The transition into
/// [`SequencerPhase::CollectingAttestations`] is subject to the deadline
/// gate; collection itself runs against the attestation propagation budget on
/// the validator side.
#[expect(clippy::too_many_arguments, reason = "One call site, wired from the work loop")]
pub(crate) async fn collect_attestations<P, V, C>(
    publisher: &P,
    validator_client: Option<&V>,
    state: &StateMachine,
    table: &TimeTable,
    clock: &C,
    metrics: &SequencerMetrics,
    block: &L2Block,
    tx_hashes: Vec<TxHash>,
    slot: SlotNumber,
) -> Result<Option<Vec<Attestation>>, SequencerError>
where
    P: RollupPublisher,
    V: ValidatorClient,
    C: Clock,
{
    let committee = publisher.get_current_epoch_committee().await?;
    if committee.is_empty() {
        debug!("Committee is empty, publishing without attestations");
        return Ok(None);
    }

    let validator_client = validator_client.ok_or(SequencerError::NoValidator)?;

    state.set(
        table,
        clock,
        metrics,
        SequencerPhase::CollectingAttestations,
        slot,
    )?;

    let threshold = attestation_threshold(committee.len());
    debug!(
        committee_size = committee.len(),
        threshold,
        "Collecting attestations"
    );

    let Some(proposal) = validator_client
        .create_block_proposal(block.header, block.archive_root, tx_hashes)
        .await
    else {
        warn!("Validator client failed to create a block proposal, publishing without attestations");
        return Ok(None);
    };

    // The wire side is fire-and-forget, but the send handle is awaited so a
    // flush cannot outrun an unsent proposal
    validator_client
        .broadcast_block_proposal(proposal.clone())
        .await;

    let collection_started = Instant::now();
    let attestations = validator_client
        .collect_attestations(&proposal, threshold)
        .await?;
    metrics.record_attestation_collection(collection_started.elapsed());

    Ok(Some(order_by_committee(attestations, &committee)))
}

/// Reorder attestations to committee order, as the rollup contract requires.
///
/// Unknown signers are dropped; duplicate attestations keep the first
/// received.
pub(crate) fn order_by_committee(
    attestations: Vec<Attestation>,
    committee: &[EthAddress],
) -> Vec<Attestation> {
    committee
        .iter()
        .filter_map(|member| {
            attestations
                .iter()
                .find(|attestation| attestation.signer == *member)
                .copied()
        })
        .collect()
}
