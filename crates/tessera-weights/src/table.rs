use crate::error::{Result, WeightsError};
use serde::{Deserialize, Serialize};
use tessera_types::{Address, Epoch, Record, RecordKind, Slot, TokenAmount};
use tracing::{debug, info};

/// Fixed-point scale for mint weights: a weight of 1.0 is stored as 1e12,
/// giving twelve decimal places of precision in stake aggregation.
pub const WEIGHT_PRECISION: u128 = 1_000_000_000_000;

/// One mint's weight inside an epoch's table, with write provenance.
///
/// `slot_set` is fixed when the entry is first written; `slot_updated`
/// follows every subsequent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightEntry {
    mint: Address,
    weight: u128,
    slot_set: Slot,
    slot_updated: Slot,
    reserved: [u8; 16],
}

impl WeightEntry {
    fn new(mint: Address, weight: u128, current_slot: Slot) -> Self {
        Self {
            mint,
            weight,
            slot_set: current_slot,
            slot_updated: current_slot,
            reserved: [0; 16],
        }
    }

    fn update(&mut self, weight: u128, current_slot: Slot) {
        self.weight = weight;
        self.slot_updated = current_slot;
    }

    pub const fn mint(&self) -> Address {
        self.mint
    }

    pub const fn weight(&self) -> u128 {
        self.weight
    }

    pub const fn slot_set(&self) -> Slot {
        self.slot_set
    }

    pub const fn slot_updated(&self) -> Slot {
        self.slot_updated
    }
}

/// The canonical mint → weight snapshot for one epoch.
///
/// The table is bound to the registry's mint set at creation, appends
/// entries in first-write order while open, and freezes permanently once
/// every required mint has a weight and `finalize` is called. The next
/// epoch gets a fresh table; a frozen one is never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightTable {
    pub network: Address,
    pub epoch: Epoch,
    slot_created: Slot,
    slot_finalized: Slot,
    mints: Vec<Address>,
    entries: Vec<WeightEntry>,
    reserved: [u8; 32],
}

impl Record for WeightTable {
    const KIND: RecordKind = RecordKind::WeightTable;
}

impl WeightTable {
    const NOT_FINALIZED: Slot = u64::MAX;

    /// Open a table for `epoch`, bound to the mints registered at creation
    /// time. Later registrations belong to later epochs.
    pub fn new(network: Address, epoch: Epoch, mints: Vec<Address>, slot_created: Slot) -> Self {
        Self {
            network,
            epoch,
            slot_created,
            slot_finalized: Self::NOT_FINALIZED,
            mints,
            entries: Vec::new(),
            reserved: [0; 32],
        }
    }

    /// Deterministic table record address for `(network, epoch)`.
    pub fn derive_address(network: &Address, epoch: Epoch) -> Address {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tessera:weight_table");
        hasher.update(network.as_bytes());
        hasher.update(&epoch.to_le_bytes());
        Address::from_bytes(*hasher.finalize().as_bytes())
    }

    pub fn slot_created(&self) -> Slot {
        self.slot_created
    }

    pub fn is_finalized(&self) -> bool {
        self.slot_finalized != Self::NOT_FINALIZED
    }

    pub fn slot_finalized(&self) -> Option<Slot> {
        if self.is_finalized() {
            Some(self.slot_finalized)
        } else {
            None
        }
    }

    /// The mint set this table must cover before it can finalize.
    pub fn required_mints(&self) -> &[Address] {
        &self.mints
    }

    /// Entries in first-write order.
    pub fn entries(&self) -> &[WeightEntry] {
        &self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, mint: &Address) -> Option<&WeightEntry> {
        self.entries.iter().find(|e| e.mint() == *mint)
    }

    pub fn weight(&self, mint: &Address) -> Result<u128> {
        self.entry(mint)
            .map(WeightEntry::weight)
            .ok_or(WeightsError::WeightNotFound(*mint))
    }

    /// Upsert a mint's weight. First write fixes `slot_set`; every write
    /// stamps `slot_updated`. Rejected once the table is frozen or when the
    /// mint was not registered at table creation.
    pub fn set_weight(&mut self, mint: Address, weight: u128, current_slot: Slot) -> Result<()> {
        if self.is_finalized() {
            return Err(WeightsError::TableFrozen(self.epoch));
        }
        if !self.mints.contains(&mint) {
            return Err(WeightsError::InvalidMint(mint));
        }
        match self.entries.iter_mut().find(|e| e.mint() == mint) {
            Some(entry) => entry.update(weight, current_slot),
            None => self.entries.push(WeightEntry::new(mint, weight, current_slot)),
        }
        debug!(
            epoch = self.epoch,
            mint = %mint,
            weight,
            slot = current_slot,
            "weight set"
        );
        Ok(())
    }

    fn missing_count(&self) -> usize {
        self.mints
            .iter()
            .filter(|mint| self.entry(mint).is_none())
            .count()
    }

    /// Freeze the table. Fails while any required mint lacks a weight;
    /// afterwards every `set_weight` fails with `TableFrozen`.
    pub fn finalize(&mut self, current_slot: Slot) -> Result<()> {
        if self.is_finalized() {
            return Err(WeightsError::TableFrozen(self.epoch));
        }
        let missing = self.missing_count();
        if missing > 0 {
            return Err(WeightsError::IncompleteTable {
                epoch: self.epoch,
                missing,
                required: self.mints.len(),
            });
        }
        self.slot_finalized = current_slot;
        info!(
            epoch = self.epoch,
            entries = self.entries.len(),
            slot = current_slot,
            "weight table finalized"
        );
        Ok(())
    }

    /// `amount × weight / WEIGHT_PRECISION` in checked u128 arithmetic.
    /// Overflow aborts the caller's operation; it is never clamped, since a
    /// clamped product would misallocate rewards.
    pub fn stake_weight(&self, mint: &Address, amount: TokenAmount) -> Result<u128> {
        let weight = self.weight(mint)?;
        let product = (amount.units() as u128)
            .checked_mul(weight)
            .ok_or(WeightsError::ArithmeticOverflow)?;
        Ok(product / WEIGHT_PRECISION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_for(mints: &[Address]) -> WeightTable {
        WeightTable::new(Address::new_unique(), 7, mints.to_vec(), 1_000)
    }

    #[test]
    fn test_set_weight_rejects_unregistered_mint() {
        let mut table = table_for(&[Address::new_unique()]);
        let outsider = Address::new_unique();
        assert_eq!(
            table.set_weight(outsider, WEIGHT_PRECISION, 1_001),
            Err(WeightsError::InvalidMint(outsider))
        );
    }

    #[test]
    fn test_slot_set_is_immutable_slot_updated_follows() {
        let mint = Address::new_unique();
        let mut table = table_for(&[mint]);

        table.set_weight(mint, 5, 1_001).unwrap();
        table.set_weight(mint, 9, 1_004).unwrap();

        let entry = table.entry(&mint).unwrap();
        assert_eq!(entry.weight(), 9);
        assert_eq!(entry.slot_set(), 1_001);
        assert_eq!(entry.slot_updated(), 1_004);
        assert_eq!(table.entry_count(), 1);
    }

    #[test]
    fn test_entries_keep_first_write_order() {
        let a = Address::new_unique();
        let b = Address::new_unique();
        let mut table = table_for(&[a, b]);

        table.set_weight(b, 2, 1_001).unwrap();
        table.set_weight(a, 1, 1_002).unwrap();
        table.set_weight(b, 3, 1_003).unwrap();

        let order: Vec<Address> = table.entries().iter().map(|e| e.mint()).collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn test_finalize_requires_every_mint() {
        let a = Address::new_unique();
        let b = Address::new_unique();
        let mut table = table_for(&[a, b]);

        table.set_weight(a, 1, 1_001).unwrap();
        assert_eq!(
            table.finalize(1_002),
            Err(WeightsError::IncompleteTable {
                epoch: 7,
                missing: 1,
                required: 2
            })
        );

        table.set_weight(b, 2, 1_003).unwrap();
        table.finalize(1_004).unwrap();
        assert_eq!(table.slot_finalized(), Some(1_004));
    }

    #[test]
    fn test_frozen_table_rejects_writes() {
        let mint = Address::new_unique();
        let mut table = table_for(&[mint]);
        table.set_weight(mint, 1, 1_001).unwrap();
        table.finalize(1_002).unwrap();

        assert_eq!(
            table.set_weight(mint, 2, 1_003),
            Err(WeightsError::TableFrozen(7))
        );
        assert_eq!(table.finalize(1_004), Err(WeightsError::TableFrozen(7)));
        assert_eq!(table.weight(&mint), Ok(1));
    }

    #[test]
    fn test_stake_weight_fixed_point() {
        let mint = Address::new_unique();
        let mut table = table_for(&[mint]);
        // 1.5 in fixed point
        table
            .set_weight(mint, 3 * WEIGHT_PRECISION / 2, 1_001)
            .unwrap();

        assert_eq!(
            table.stake_weight(&mint, TokenAmount::new(100)).unwrap(),
            150
        );
        assert_eq!(table.stake_weight(&mint, TokenAmount::ZERO).unwrap(), 0);
    }

    #[test]
    fn test_stake_weight_overflow_is_an_error() {
        let mint = Address::new_unique();
        let mut table = table_for(&[mint]);
        table.set_weight(mint, u128::MAX, 1_001).unwrap();

        assert_eq!(
            table.stake_weight(&mint, TokenAmount::new(2)),
            Err(WeightsError::ArithmeticOverflow)
        );
    }

    #[test]
    fn test_record_round_trip_and_address() {
        let mint = Address::new_unique();
        let mut table = table_for(&[mint]);
        table.set_weight(mint, 42, 1_001).unwrap();

        let bytes = table.encode().unwrap();
        assert_eq!(WeightTable::decode(&bytes).unwrap(), table);

        let network = table.network;
        assert_eq!(
            WeightTable::derive_address(&network, 7),
            WeightTable::derive_address(&network, 7)
        );
        assert_ne!(
            WeightTable::derive_address(&network, 7),
            WeightTable::derive_address(&network, 8)
        );
    }
}
