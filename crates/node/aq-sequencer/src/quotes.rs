//! Bidding on epoch proof quotes.
//!
//! While a block is being built the sequencer concurrently looks for the
//! cheapest valid quote to prove the claimable prior epoch. A found quote is
//! attached to the block publication; when no block is going out this tick
//! the claim is submitted directly.

use crate::error::SequencerError;
use aq_client_api::{RollupPublisher, TxPool};
use aq_core_primitives::proposal::EpochProofQuote;
use aq_core_primitives::slots::{EpochNumber, SlotNumber};
use tracing::{debug, info, warn};

/// Quotes that may be claimed for the given epoch at the current slot
pub(crate) fn eligible_quotes(
    quotes: Vec<EpochProofQuote>,
    epoch: EpochNumber,
    current_slot: SlotNumber,
) -> Vec<EpochProofQuote> {
    quotes
        .into_iter()
        .filter(|quote| quote.epoch_to_prove == epoch && quote.valid_until_slot >= current_slot)
        .collect()
}

/// Find the cheapest publisher-validated quote for the claimable epoch.
///
/// The quote is opportunistic: every failure along the way is logged and
/// degrades to "no quote this tick".
pub(crate) async fn collect_proof_quote<P, TP>(
    publisher: &P,
    tx_pool: &TP,
    current_slot: SlotNumber,
) -> Option<EpochProofQuote>
where
    P: RollupPublisher,
    TP: TxPool,
{
    let epoch = match publisher.get_claimable_epoch().await {
        Ok(Some(epoch)) => epoch,
        Ok(None) => return None,
        Err(error) => {
            debug!(%error, "Failed to query the claimable epoch");
            return None;
        }
    };

    let quotes = match tx_pool.epoch_proof_quotes(epoch).await {
        Ok(quotes) => quotes,
        Err(error) => {
            warn!(%epoch, %error, "Failed to fetch epoch proof quotes");
            return None;
        }
    };
    debug!(%epoch, count = quotes.len(), "Retrieved quotes for epoch");

    let mut validated = Vec::new();
    for quote in eligible_quotes(quotes, epoch, current_slot) {
        match publisher.validate_proof_quote(&quote).await {
            Ok(Some(quote)) => validated.push(quote),
            Ok(None) => {}
            Err(error) => {
                debug!(%error, prover = %quote.prover, "Quote failed validation");
            }
        }
    }

    validated.into_iter().min()
}

/// Claim the epoch proof right directly, outside of a block publication.
///
/// Used on ticks that skip building; a claim that does not land fails the
/// tick.
pub(crate) async fn claim_proof_right<P, TP>(
    publisher: &P,
    tx_pool: &TP,
    current_slot: SlotNumber,
) -> Result<(), SequencerError>
where
    P: RollupPublisher,
    TP: TxPool,
{
    let Some(quote) = collect_proof_quote(publisher, tx_pool, current_slot).await else {
        return Ok(());
    };
    let epoch = quote.epoch_to_prove;

    let claimed = publisher
        .claim_epoch_proof_right(&quote)
        .await
        .map_err(|error| SequencerError::ClaimFailed {
            epoch,
            reason: error.to_string(),
        })?;
    if !claimed {
        return Err(SequencerError::ClaimFailed {
            epoch,
            reason: "Claim transaction did not land".to_string(),
        });
    }

    info!(%epoch, basis_point_fee = quote.basis_point_fee, "Claimed epoch proof right");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core_primitives::address::EthAddress;
    use aq_core_primitives::proposal::Signature;

    fn quote(epoch: u64, valid_until: u64, fee: u32) -> EpochProofQuote {
        EpochProofQuote {
            epoch_to_prove: EpochNumber::new(epoch),
            valid_until_slot: SlotNumber::new(valid_until),
            basis_point_fee: fee,
            prover: EthAddress([fee as u8; EthAddress::SIZE]),
            signature: Signature::default(),
        }
    }

    #[test]
    fn filters_by_epoch_and_expiry() {
        let quotes = vec![
            quote(3, 100, 50),
            quote(2, 100, 10),
            quote(3, 5, 20),
        ];

        let eligible = eligible_quotes(quotes, EpochNumber::new(3), SlotNumber::new(10));
        assert_eq!(eligible, vec![quote(3, 100, 50)]);
    }

    #[test]
    fn quotes_order_by_fee() {
        let cheapest = vec![quote(1, 100, 100), quote(1, 100, 50), quote(1, 100, 75)]
            .into_iter()
            .min()
            .unwrap();
        assert_eq!(cheapest.basis_point_fee, 50);
    }
}
