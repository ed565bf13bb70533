use serde::{Deserialize, Serialize};
use tessera_types::{Address, Record, RecordKind, Slot, TokenAmount};

/// A stake-holding pool backing Operators and the Network. Each vault holds
/// exactly one supported mint and records the total stake delegated out of
/// it; the snapshot layer pairs that total with the vault's operators to
/// form per-operator delegations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub address: Address,
    admin: Address,
    mint: Address,
    delegated: TokenAmount,
    index: u64,
    created_at: Slot,
    reserved: [u8; 32],
}

impl Record for Vault {
    const KIND: RecordKind = RecordKind::Vault;
}

impl Vault {
    pub fn new(address: Address, admin: Address, mint: Address, index: u64, created_at: Slot) -> Self {
        Self {
            address,
            admin,
            mint,
            delegated: TokenAmount::ZERO,
            index,
            created_at,
            reserved: [0; 32],
        }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn mint(&self) -> Address {
        self.mint
    }

    pub fn delegated(&self) -> TokenAmount {
        self.delegated
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn created_at(&self) -> Slot {
        self.created_at
    }

    /// Written by the staking subsystem whenever the vault's delegation
    /// total changes; the snapshot reader consumes it at epoch boundaries.
    pub fn set_delegated(&mut self, total: TokenAmount) {
        self.delegated = total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_round_trip() {
        let vault = Vault::new(
            Address::new_unique(),
            Address::new_unique(),
            Address::new_unique(),
            3,
            77,
        );
        let bytes = vault.encode().unwrap();
        assert_eq!(Vault::decode(&bytes).unwrap(), vault);
    }

    #[test]
    fn test_delegated_total_survives_round_trip() {
        let mut vault = Vault::new(
            Address::new_unique(),
            Address::new_unique(),
            Address::new_unique(),
            0,
            1,
        );
        assert_eq!(vault.delegated(), TokenAmount::ZERO);
        vault.set_delegated(TokenAmount::new(2_500));

        let bytes = vault.encode().unwrap();
        assert_eq!(
            Vault::decode(&bytes).unwrap().delegated(),
            TokenAmount::new(2_500)
        );
    }
}
