use crate::error::{LedgerError, Result};
use std::collections::BTreeMap;
use tessera_types::{peek_kind, Address, Record, RecordKind, Slot};

/// The single-writer account store the processor mutates.
///
/// Authoritative: nothing above this layer caches record state as a source
/// of truth. Mutations happen only inside [`Processor::process`], which the
/// hosting environment serializes.
///
/// [`Processor::process`]: crate::processor::Processor::process
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    slot: Slot,
    accounts: BTreeMap<Address, Vec<u8>>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Host-driven clock. Slots never move backwards.
    pub fn advance_slot(&mut self, by: u64) {
        self.slot = self.slot.saturating_add(by);
    }

    pub fn set_slot(&mut self, slot: Slot) {
        self.slot = self.slot.max(slot);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    pub fn raw(&self, address: &Address) -> Option<&[u8]> {
        self.accounts.get(address).map(Vec::as_slice)
    }

    /// Decode the record at `address`. A discriminator mismatch surfaces as
    /// the underlying consistency fault, never as "not found".
    pub fn record<T: Record>(&self, address: &Address) -> Result<T> {
        let bytes = self
            .accounts
            .get(address)
            .ok_or(LedgerError::AccountNotFound(*address))?;
        Ok(T::decode(bytes)?)
    }

    pub fn record_if_present<T: Record>(&self, address: &Address) -> Result<Option<T>> {
        match self.accounts.get(address) {
            None => Ok(None),
            Some(bytes) => Ok(Some(T::decode(bytes)?)),
        }
    }

    pub fn write_record<T: Record>(&mut self, address: Address, record: &T) -> Result<()> {
        self.accounts.insert(address, record.encode()?);
        Ok(())
    }

    /// Create a record where none exists yet.
    pub fn create_record<T: Record>(&mut self, address: Address, record: &T) -> Result<()> {
        if self.contains(&address) {
            return Err(LedgerError::AccountAlreadyExists(address));
        }
        self.write_record(address, record)
    }

    pub fn count_kind(&self, kind: RecordKind) -> u64 {
        self.accounts
            .values()
            .filter(|bytes| peek_kind(bytes).ok().flatten() == Some(kind))
            .count() as u64
    }

    /// All records of one kind, for snapshot readers.
    pub fn records_of_kind(&self, kind: RecordKind) -> Vec<(Address, Vec<u8>)> {
        self.accounts
            .iter()
            .filter(|(_, bytes)| peek_kind(bytes).ok().flatten() == Some(kind))
            .map(|(address, bytes)| (*address, bytes.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_registry::{Network, Operator};
    use tessera_types::EpochSchedule;

    #[test]
    fn test_create_then_overwrite_rules() {
        let mut state = LedgerState::new();
        let address = Address::new_unique();
        let network = Network::new(
            address,
            Address::new_unique(),
            Address::new_unique(),
            0,
            EpochSchedule::default(),
            0,
        )
        .unwrap();

        state.create_record(address, &network).unwrap();
        assert!(matches!(
            state.create_record(address, &network),
            Err(LedgerError::AccountAlreadyExists(_))
        ));
        // In-place update through write_record is allowed.
        state.write_record(address, &network).unwrap();
        assert_eq!(state.record::<Network>(&address).unwrap(), network);
    }

    #[test]
    fn test_wrong_kind_read_is_a_fault() {
        let mut state = LedgerState::new();
        let address = Address::new_unique();
        let network = Network::new(
            address,
            Address::new_unique(),
            Address::new_unique(),
            0,
            EpochSchedule::default(),
            0,
        )
        .unwrap();
        state.create_record(address, &network).unwrap();

        assert!(matches!(
            state.record::<Operator>(&address),
            Err(LedgerError::Record(_))
        ));
        assert!(matches!(
            state.record::<Network>(&Address::new_unique()),
            Err(LedgerError::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_slot_never_regresses() {
        let mut state = LedgerState::new();
        state.set_slot(100);
        state.set_slot(50);
        assert_eq!(state.slot(), 100);
        state.advance_slot(5);
        assert_eq!(state.slot(), 105);
    }
}
