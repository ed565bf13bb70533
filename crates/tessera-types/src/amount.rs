use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Reward amount in base token units.
///
/// All arithmetic on amounts is explicit: callers choose checked or
/// saturating forms. Reward allocation paths must use the checked forms so
/// overflow aborts the operation instead of misallocating.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    pub const fn units(&self) -> u64 {
        self.0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} units", self.0)
    }
}

impl From<u64> for TokenAmount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc.saturating_add(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_add_overflow() {
        let max = TokenAmount::new(u64::MAX);
        assert!(max.checked_add(TokenAmount::new(1)).is_none());
        assert_eq!(max.saturating_add(TokenAmount::new(1)), max);
    }

    #[test]
    fn test_checked_sub_underflow() {
        assert!(TokenAmount::ZERO.checked_sub(TokenAmount::new(1)).is_none());
        assert_eq!(
            TokenAmount::ZERO.saturating_sub(TokenAmount::new(1)),
            TokenAmount::ZERO
        );
    }
}
