use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use tessera_types::{Address, EpochSchedule, Record, RecordKind, Slot};

/// Maximum fee expressible in basis points.
pub const MAX_FEE_BPS: u64 = 10_000;

/// The coordinating entity. Owns the epoch schedule and fee parameters that
/// govern every distribution; created once per deployment context and only
/// ever admin-mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub address: Address,
    admin: Address,
    fee_wallet: Address,
    fee_bps: u64,
    schedule: EpochSchedule,
    created_at: Slot,
    reserved: [u8; 32],
}

impl Record for Network {
    const KIND: RecordKind = RecordKind::Network;
}

impl Network {
    pub fn new(
        address: Address,
        admin: Address,
        fee_wallet: Address,
        fee_bps: u64,
        schedule: EpochSchedule,
        created_at: Slot,
    ) -> Result<Self> {
        if fee_bps > MAX_FEE_BPS {
            return Err(RegistryError::FeeTooHigh {
                bps: fee_bps,
                max: MAX_FEE_BPS,
            });
        }
        Ok(Self {
            address,
            admin,
            fee_wallet,
            fee_bps,
            schedule,
            created_at,
            reserved: [0; 32],
        })
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn fee_wallet(&self) -> Address {
        self.fee_wallet
    }

    pub fn fee_bps(&self) -> u64 {
        self.fee_bps
    }

    pub fn schedule(&self) -> EpochSchedule {
        self.schedule
    }

    pub fn created_at(&self) -> Slot {
        self.created_at
    }

    pub fn set_admin(&mut self, new_admin: Address) {
        self.admin = new_admin;
    }

    pub fn set_fees(&mut self, fee_wallet: Address, fee_bps: u64) -> Result<()> {
        if fee_bps > MAX_FEE_BPS {
            return Err(RegistryError::FeeTooHigh {
                bps: fee_bps,
                max: MAX_FEE_BPS,
            });
        }
        self.fee_wallet = fee_wallet;
        self.fee_bps = fee_bps;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> Network {
        Network::new(
            Address::new_unique(),
            Address::new_unique(),
            Address::new_unique(),
            250,
            EpochSchedule::default(),
            42,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_excessive_fee() {
        let err = Network::new(
            Address::new_unique(),
            Address::new_unique(),
            Address::new_unique(),
            MAX_FEE_BPS + 1,
            EpochSchedule::default(),
            0,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RegistryError::FeeTooHigh {
                bps: MAX_FEE_BPS + 1,
                max: MAX_FEE_BPS
            }
        );
    }

    #[test]
    fn test_admin_rotation() {
        let mut net = network();
        let new_admin = Address::new_unique();
        net.set_admin(new_admin);
        assert_eq!(net.admin(), new_admin);
    }

    #[test]
    fn test_record_round_trip() {
        let net = network();
        let bytes = net.encode().unwrap();
        assert_eq!(Network::decode(&bytes).unwrap(), net);
    }
}
