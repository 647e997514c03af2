//! Slot, epoch and block numbering.

use core::fmt;
use derive_more::{Add, AddAssign, Display, From, Into, Sub, SubAssign};

/// L2 slot number.
///
/// Exactly one elected proposer may publish a block during a slot.
/// [`SlotNumber::ZERO`] doubles as the "no slot relevant" sentinel used for
/// transitions into unrestricted sequencer phases.
#[derive(
    Debug,
    Display,
    Default,
    Copy,
    Clone,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    From,
    Into,
    Add,
    AddAssign,
    Sub,
    SubAssign,
)]
pub struct SlotNumber(u64);

impl SlotNumber {
    /// Slot number 0, the "no slot relevant" sentinel
    pub const ZERO: Self = Self(0);
    /// Slot number 1
    pub const ONE: Self = Self(1);

    /// Create new instance
    #[inline(always)]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Get internal representation
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Epoch number.
///
/// A contiguous run of slots; epoch proofs and quote-based claims are per
/// epoch.
#[derive(
    Debug,
    Display,
    Default,
    Copy,
    Clone,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    From,
    Into,
    Add,
    AddAssign,
    Sub,
    SubAssign,
)]
pub struct EpochNumber(u64);

impl EpochNumber {
    /// Epoch number 0
    pub const ZERO: Self = Self(0);

    /// Create new instance
    #[inline(always)]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Get internal representation
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// L2 block number
#[derive(
    Display,
    Default,
    Copy,
    Clone,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    From,
    Into,
    Add,
    AddAssign,
    Sub,
    SubAssign,
)]
pub struct BlockNumber(u64);

impl BlockNumber {
    /// Block number 0 (genesis, never built by a sequencer)
    pub const ZERO: Self = Self(0);
    /// Block number 1, the first block a sequencer may build
    pub const ONE: Self = Self(1);

    /// Create new instance
    #[inline(always)]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Get internal representation
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Checked subtraction, returns `None` on underflow
    #[inline]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }

    /// Saturating addition
    #[inline]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Debug for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockNumber({})", self.0)
    }
}
