use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("progress has not been initialized")]
    Uninitialized,

    #[error("progress tally overflow")]
    ArithmeticOverflow,

    #[error("increment of {amount} would push tally {tally} past total {total}")]
    ExceedsTotal { tally: u64, total: u64, amount: u64 },
}

/// Cumulative units processed versus an expected total for an incremental
/// multi-step operation (root upload, claim accounting).
///
/// Invariant: `0 <= tally <= total` whenever initialized; complete iff
/// `tally == total`. The uninitialized state is an explicit sentinel so a
/// zero-filled record is never mistaken for "0 of 0 done".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    tally: u64,
    total: u64,
    reserved: [u8; 8],
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            tally: Self::SENTINEL,
            total: Self::SENTINEL,
            reserved: [0; 8],
        }
    }
}

impl Progress {
    const SENTINEL: u64 = u64::MAX;

    pub fn new(total: u64) -> Self {
        Self {
            tally: 0,
            total,
            reserved: [0; 8],
        }
    }

    pub fn tally(&self) -> u64 {
        self.tally
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_initialized(&self) -> bool {
        self.tally != Self::SENTINEL && self.total != Self::SENTINEL
    }

    pub fn is_complete(&self) -> bool {
        self.is_initialized() && self.tally == self.total
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.tally)
    }

    /// Advance the tally. Rejects anything that would break the
    /// `tally <= total` invariant rather than clamping.
    pub fn increment(&mut self, amount: u64) -> Result<(), ProgressError> {
        if !self.is_initialized() {
            return Err(ProgressError::Uninitialized);
        }
        let next = self
            .tally
            .checked_add(amount)
            .ok_or(ProgressError::ArithmeticOverflow)?;
        if next > self.total {
            return Err(ProgressError::ExceedsTotal {
                tally: self.tally,
                total: self.total,
                amount,
            });
        }
        self.tally = next;
        Ok(())
    }
}
