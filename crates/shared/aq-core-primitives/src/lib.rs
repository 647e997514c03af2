//! Core primitives of the Aqueduct rollup.
//!
//! Value types shared between the sequencer, the validator client and the L1
//! publisher: slot and epoch numbers, digests, addresses, block headers and
//! the attestation/proof-quote payloads exchanged around block production.

pub mod address;
pub mod block;
pub mod hashes;
pub mod proposal;
pub mod slots;
pub mod tx;
