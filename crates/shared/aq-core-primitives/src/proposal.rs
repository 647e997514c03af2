//! Proposals, attestations, epoch proof quotes and votes.

use crate::address::EthAddress;
use crate::block::BlockHeader;
use crate::hashes::{ArchiveRoot, TxHash};
use crate::slots::{EpochNumber, SlotNumber};
use core::cmp::Ordering;
use core::fmt;
use derive_more::Display;

/// Opaque 65-byte ECDSA-shaped signature.
///
/// The sequencer never verifies signatures; it only carries them between the
/// validator client and the publisher.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Signature(pub [u8; Signature::SIZE]);

impl Signature {
    /// Size in bytes
    pub const SIZE: usize = 65;
}

impl Default for Signature {
    fn default() -> Self {
        Self([0; Self::SIZE])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A committee member's signature over a block proposal.
///
/// The rollup contract requires attestations sorted to committee order, so
/// the signer travels alongside the signature.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Attestation {
    /// Committee member that signed
    pub signer: EthAddress,
    /// Signature over the proposal
    pub signature: Signature,
}

/// Block proposal broadcast to the committee before attestation collection
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BlockProposal {
    /// Header of the proposed block
    pub header: BlockHeader,
    /// Archive root after the proposed block
    pub archive_root: ArchiveRoot,
    /// Hashes of the transactions in the proposed block
    pub tx_hashes: Vec<TxHash>,
}

/// A signed bid to prove a prior epoch, priced in basis points.
///
/// Quotes are totally ordered by fee (ascending), with the prover address as
/// the tie-break, so "the cheapest quote" is well-defined.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EpochProofQuote {
    /// Epoch the bidder offers to prove
    pub epoch_to_prove: EpochNumber,
    /// Last slot at which this quote may still be claimed
    pub valid_until_slot: SlotNumber,
    /// Fee in basis points of the epoch rewards
    pub basis_point_fee: u32,
    /// Bidder address
    pub prover: EthAddress,
    /// Signature over the quote payload
    pub signature: Signature,
}

impl Ord for EpochProofQuote {
    fn cmp(&self, other: &Self) -> Ordering {
        self.basis_point_fee
            .cmp(&other.basis_point_fee)
            .then_with(|| self.prover.cmp(&other.prover))
    }
}

impl PartialOrd for EpochProofQuote {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Kind of L1 vote the sequencer casts alongside a proposal
#[derive(Debug, Display, Copy, Clone, Eq, PartialEq)]
pub enum VoteKind {
    /// Governance proposal vote
    #[display("governance")]
    Governance,
    /// Slashing payload vote
    #[display("slashing")]
    Slashing,
}
