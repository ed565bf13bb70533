use serde::{Deserialize, Serialize};

/// Ledger height. Monotonic, assigned by the host environment.
pub type Slot = u64;

/// Distribution epoch number: a fixed slot interval.
pub type Epoch = u64;

/// Slot geometry of an epoch plus the relationship and claim delays that
/// hang off it.
///
/// `warmup_slots` and `cooldown_slots` gate ticket eligibility: a
/// relationship only counts for an epoch once it has been active for a full
/// warmup, and keeps counting through a full cooldown after deactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSchedule {
    pub epoch_length_slots: u64,
    pub warmup_slots: u64,
    pub cooldown_slots: u64,
    pub claim_window_slots: u64,
}

impl Default for EpochSchedule {
    fn default() -> Self {
        Self {
            epoch_length_slots: 10_000,
            warmup_slots: 1_000,
            cooldown_slots: 1_000,
            claim_window_slots: 30_000,
        }
    }
}

impl EpochSchedule {
    pub fn validate(&self) -> Result<(), String> {
        if self.epoch_length_slots == 0 {
            return Err("epoch_length_slots must be non-zero".to_string());
        }
        Ok(())
    }

    /// The epoch a slot falls in. The schedule must be validated first;
    /// a zero epoch length maps everything to epoch 0 rather than dividing
    /// by zero.
    pub fn epoch_for_slot(&self, slot: Slot) -> Epoch {
        if self.epoch_length_slots == 0 {
            return 0;
        }
        slot / self.epoch_length_slots
    }

    /// First slot of an epoch, i.e. the snapshot boundary the keeper pins to.
    pub fn start_slot(&self, epoch: Epoch) -> Option<Slot> {
        epoch.checked_mul(self.epoch_length_slots)
    }

    /// First slot of the epoch after `epoch`.
    pub fn end_slot(&self, epoch: Epoch) -> Option<Slot> {
        epoch.checked_add(1)?.checked_mul(self.epoch_length_slots)
    }
}
