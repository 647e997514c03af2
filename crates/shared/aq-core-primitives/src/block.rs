//! Block headers, global variables and completed L2 blocks.

use crate::address::EthAddress;
use crate::hashes::{ArchiveRoot, Digest, TxHash};
use crate::slots::{BlockNumber, SlotNumber};
use crate::tx::ProcessedTx;

/// Gas envelope of a whole block
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct GasLimits {
    /// Data-availability gas limit
    pub da_gas: u64,
    /// L2 execution gas limit
    pub l2_gas: u64,
}

/// Variables fixed for every transaction of a block.
///
/// Produced by the external global-variable builder; the sequencer only
/// threads them through to the processor, the block builder and the header.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct GlobalVariables {
    /// Number of the block being built
    pub block_number: BlockNumber,
    /// Slot the block is proposed in
    pub slot_number: SlotNumber,
    /// Unix timestamp (seconds) of the slot
    pub timestamp: u64,
    /// Recipient of L1 rewards
    pub coinbase: EthAddress,
    /// Recipient of L2 fees
    pub fee_recipient: EthAddress,
    /// Gas envelope of the block
    pub gas_limits: GasLimits,
}

/// Commitment to the contents of a block body
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct ContentCommitment {
    /// Digest over all transaction side effects
    pub txs_effects_hash: Digest,
    /// Digest over L2→L1 messages
    pub out_hash: Digest,
}

/// Header of an L2 block.
///
/// The same shape is submitted to the publisher twice: once before the build
/// with zeroed commitment and state reference (only the parent archive root
/// and global variables are known), and once after the build fully populated.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct BlockHeader {
    /// Root of the archive this block is built on
    pub last_archive_root: ArchiveRoot,
    /// Commitment to the block contents
    pub content_commitment: ContentCommitment,
    /// Reference to the world state after this block
    pub state_reference: Digest,
    /// Variables fixed for the whole block
    pub global_variables: GlobalVariables,
}

impl BlockHeader {
    /// Header for a block that has not been built yet.
    ///
    /// Commitment and state reference are zeroed; the publisher validates
    /// such headers against the current L1 view before the build starts.
    pub fn pre_build(last_archive_root: ArchiveRoot, global_variables: GlobalVariables) -> Self {
        Self {
            last_archive_root,
            content_commitment: ContentCommitment::default(),
            state_reference: Digest::ZERO,
            global_variables,
        }
    }
}

/// A fully built L2 block, ready for publication
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct L2Block {
    /// Block header with populated commitments
    pub header: BlockHeader,
    /// Archive root after this block was inserted
    pub archive_root: ArchiveRoot,
    /// Transactions included in the block, in execution order
    pub txs: Vec<ProcessedTx>,
}

impl L2Block {
    /// Number of the block
    #[inline]
    pub fn number(&self) -> BlockNumber {
        self.header.global_variables.block_number
    }

    /// Slot the block was proposed in
    #[inline]
    pub fn slot(&self) -> SlotNumber {
        self.header.global_variables.slot_number
    }

    /// Hashes of the included transactions, in order
    pub fn tx_hashes(&self) -> Vec<TxHash> {
        self.txs.iter().map(ProcessedTx::hash).collect()
    }

    /// Serialized size of the block body
    pub fn body_size_in_bytes(&self) -> u64 {
        self.txs.iter().map(|tx| tx.tx.size_in_bytes).sum()
    }
}
