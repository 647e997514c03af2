//! Ethereum-side addresses.

use core::fmt;
use derive_more::{AsRef, From, Into};

/// 20-byte Ethereum address.
///
/// Identifies committee members, the coinbase and epoch proof bidders on the
/// L1 side.
#[derive(Default, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, From, Into, AsRef)]
pub struct EthAddress(pub [u8; EthAddress::SIZE]);

impl EthAddress {
    /// Size in bytes
    pub const SIZE: usize = 20;

    /// All-zero address
    pub const ZERO: Self = Self([0; Self::SIZE]);
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
