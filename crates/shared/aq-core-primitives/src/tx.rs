//! Pool transactions and public-execution outcomes.

use crate::hashes::{Digest, TxHash};

/// A transaction as it sits in the pending pool.
///
/// The sequencer never interprets the payload; it only accounts for its size
/// and gas envelope when packing a block.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Tx {
    /// Hash identifying this transaction
    pub hash: TxHash,
    /// Serialized size, counted against the per-block size limit
    pub size_in_bytes: u64,
    /// Data-availability gas this transaction may consume
    pub da_gas_limit: u64,
    /// L2 execution gas this transaction may consume
    pub l2_gas_limit: u64,
}

impl Tx {
    /// Hash identifying this transaction
    #[inline(always)]
    pub fn hash(&self) -> TxHash {
        self.hash
    }
}

/// A transaction that went through the public processor successfully
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProcessedTx {
    /// The source pool transaction
    pub tx: Tx,
    /// Digest of the side effects produced by public execution
    pub effects_hash: Digest,
    /// Data-availability gas actually consumed
    pub da_gas_used: u64,
    /// L2 gas actually consumed
    pub l2_gas_used: u64,
}

impl ProcessedTx {
    /// Hash of the source transaction
    #[inline(always)]
    pub fn hash(&self) -> TxHash {
        self.tx.hash
    }
}

/// A transaction the public processor gave up on, with the reason
#[derive(Debug, Clone)]
pub struct FailedTx {
    /// Hash of the failed transaction
    pub hash: TxHash,
    /// Why public execution rejected it
    pub reason: String,
}
