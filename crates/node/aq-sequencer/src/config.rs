//! Sequencer configuration and rollup timing constants.

use aq_core_primitives::address::EthAddress;
use aq_core_primitives::hashes::Digest;
use aq_core_primitives::slots::SlotNumber;
use std::time::Duration;

/// Timing constants of the rollup, immutable once constructed
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RollupConstants {
    /// L2 slot duration in seconds
    pub slot_duration: u64,
    /// L1 slot duration in seconds
    pub ethereum_slot_duration: u64,
    /// Unix timestamp (seconds) of L2 slot 0
    pub l1_genesis_time: u64,
}

impl RollupConstants {
    /// Unix timestamp (milliseconds) at which the given slot starts
    pub fn slot_start_unix_ms(&self, slot: SlotNumber) -> u64 {
        (self.l1_genesis_time + slot.as_u64() * self.slot_duration) * 1000
    }

    /// Wall-clock seconds elapsed since the given slot started, rounded to
    /// milliseconds. Negative before the slot starts.
    pub fn seconds_into_slot(&self, slot: SlotNumber, now_unix_ms: u64) -> f64 {
        let elapsed_ms = now_unix_ms as f64 - self.slot_start_unix_ms(slot) as f64;
        elapsed_ms.round() / 1000.0
    }
}

/// Runtime configuration of the sequencer.
///
/// Mutable through [`SequencerConfigUpdate`] only; the work loop reads an
/// atomic snapshot per tick.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SequencerConfig {
    /// Cadence of the work loop
    pub polling_interval: Duration,
    /// Maximum transactions packed into one block
    pub max_txs_per_block: usize,
    /// Minimum transactions required to bother proposing
    pub min_txs_per_block: usize,
    /// Maximum serialized block body size
    pub max_block_size_in_bytes: u64,
    /// Data-availability gas limit per block
    pub max_block_da_gas: u64,
    /// L2 execution gas limit per block
    pub max_block_l2_gas: u64,
    /// Recipient of L1 rewards
    pub coinbase: EthAddress,
    /// Recipient of L2 fees
    pub fee_recipient: EthAddress,
    /// Contracts that may be called during the tx setup phase
    pub allowed_in_setup: Vec<Digest>,
    /// Whether tx validators must require fee payment
    pub enforce_fees: bool,
    /// Whether phase deadlines are enforced at all
    pub enforce_time_table: bool,
    /// Seconds into an L1 slot within which the publish transaction must be
    /// included
    pub max_l1_tx_inclusion_time_into_slot: u64,
    /// Payload attached to governance votes, forwarded to the publisher
    pub governance_proposer_payload: Option<Vec<u8>>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_millis(1000),
            max_txs_per_block: 32,
            min_txs_per_block: 1,
            max_block_size_in_bytes: 1024 * 1024,
            max_block_da_gas: 10_000_000_000,
            max_block_l2_gas: 10_000_000_000,
            coinbase: EthAddress::ZERO,
            fee_recipient: EthAddress::ZERO,
            allowed_in_setup: Vec::new(),
            enforce_fees: false,
            enforce_time_table: false,
            max_l1_tx_inclusion_time_into_slot: 0,
            governance_proposer_payload: None,
        }
    }
}

impl SequencerConfig {
    /// Copy of this configuration with every explicitly-set field of the
    /// update applied
    pub fn merged_with(&self, update: &SequencerConfigUpdate) -> Self {
        let mut config = self.clone();
        if let Some(polling_interval) = update.polling_interval {
            config.polling_interval = polling_interval;
        }
        if let Some(max_txs_per_block) = update.max_txs_per_block {
            config.max_txs_per_block = max_txs_per_block;
        }
        if let Some(min_txs_per_block) = update.min_txs_per_block {
            config.min_txs_per_block = min_txs_per_block;
        }
        if let Some(max_block_size_in_bytes) = update.max_block_size_in_bytes {
            config.max_block_size_in_bytes = max_block_size_in_bytes;
        }
        if let Some(max_block_da_gas) = update.max_block_da_gas {
            config.max_block_da_gas = max_block_da_gas;
        }
        if let Some(max_block_l2_gas) = update.max_block_l2_gas {
            config.max_block_l2_gas = max_block_l2_gas;
        }
        if let Some(coinbase) = update.coinbase {
            config.coinbase = coinbase;
        }
        if let Some(fee_recipient) = update.fee_recipient {
            config.fee_recipient = fee_recipient;
        }
        if let Some(allowed_in_setup) = &update.allowed_in_setup {
            config.allowed_in_setup.clone_from(allowed_in_setup);
        }
        if let Some(enforce_fees) = update.enforce_fees {
            config.enforce_fees = enforce_fees;
        }
        if let Some(enforce_time_table) = update.enforce_time_table {
            config.enforce_time_table = enforce_time_table;
        }
        if let Some(max_inclusion) = update.max_l1_tx_inclusion_time_into_slot {
            config.max_l1_tx_inclusion_time_into_slot = max_inclusion;
        }
        if let Some(payload) = &update.governance_proposer_payload {
            config.governance_proposer_payload = Some(payload.clone());
        }
        config
    }
}

/// Partial configuration; only set fields are applied on update
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct SequencerConfigUpdate {
    /// See [`SequencerConfig::polling_interval`]
    pub polling_interval: Option<Duration>,
    /// See [`SequencerConfig::max_txs_per_block`]
    pub max_txs_per_block: Option<usize>,
    /// See [`SequencerConfig::min_txs_per_block`]
    pub min_txs_per_block: Option<usize>,
    /// See [`SequencerConfig::max_block_size_in_bytes`]
    pub max_block_size_in_bytes: Option<u64>,
    /// See [`SequencerConfig::max_block_da_gas`]
    pub max_block_da_gas: Option<u64>,
    /// See [`SequencerConfig::max_block_l2_gas`]
    pub max_block_l2_gas: Option<u64>,
    /// See [`SequencerConfig::coinbase`]
    pub coinbase: Option<EthAddress>,
    /// See [`SequencerConfig::fee_recipient`]
    pub fee_recipient: Option<EthAddress>,
    /// See [`SequencerConfig::allowed_in_setup`]
    pub allowed_in_setup: Option<Vec<Digest>>,
    /// See [`SequencerConfig::enforce_fees`]
    pub enforce_fees: Option<bool>,
    /// See [`SequencerConfig::enforce_time_table`]
    pub enforce_time_table: Option<bool>,
    /// See [`SequencerConfig::max_l1_tx_inclusion_time_into_slot`]
    pub max_l1_tx_inclusion_time_into_slot: Option<u64>,
    /// See [`SequencerConfig::governance_proposer_payload`]
    pub governance_proposer_payload: Option<Vec<u8>>,
}
