//! Digests identifying transactions, state and block history.

use core::fmt;
use derive_more::{AsRef, From, Into};

/// Opaque 32-byte commitment.
///
/// Used for state references, content commitments and everything else the
/// sequencer passes through without interpreting.
#[derive(Default, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, From, Into, AsRef)]
pub struct Digest(pub [u8; Digest::SIZE]);

impl Digest {
    /// Size in bytes
    pub const SIZE: usize = 32;

    /// All-zero digest
    pub const ZERO: Self = Self([0; Self::SIZE]);
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Hash identifying a transaction in the pool and in block bodies
#[derive(Default, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, From, Into, AsRef)]
pub struct TxHash(pub [u8; Digest::SIZE]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Commitment to the L2 block history.
///
/// The rollup contract identifies the parent a new block is built on by this
/// root.
#[derive(Default, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, From, Into, AsRef)]
pub struct ArchiveRoot(pub [u8; Digest::SIZE]);

impl ArchiveRoot {
    /// Archive root before any block has been published
    pub const GENESIS: Self = Self([0; Digest::SIZE]);
}

impl fmt::Display for ArchiveRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ArchiveRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
