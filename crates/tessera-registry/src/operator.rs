use crate::error::{RegistryError, Result};
use crate::network::MAX_FEE_BPS;
use serde::{Deserialize, Serialize};
use tessera_types::{Address, Record, RecordKind, Slot};

/// A participating infrastructure node. Registered once, admin-mutated, and
/// logically retired rather than removed so historical epochs stay auditable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub address: Address,
    admin: Address,
    fee_bps: u64,
    index: u64,
    registered_at: Slot,
    retired: bool,
    reserved: [u8; 32],
}

impl Record for Operator {
    const KIND: RecordKind = RecordKind::Operator;
}

impl Operator {
    pub fn new(
        address: Address,
        admin: Address,
        fee_bps: u64,
        index: u64,
        registered_at: Slot,
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
            fee_bps,
            index,
            registered_at,
            retired: false,
            reserved: [0; 32],
        })
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn fee_bps(&self) -> u64 {
        self.fee_bps
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn registered_at(&self) -> Slot {
        self.registered_at
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn set_admin(&mut self, new_admin: Address) -> Result<()> {
        if self.retired {
            return Err(RegistryError::OperatorRetired(self.address));
        }
        self.admin = new_admin;
        Ok(())
    }

    pub fn set_fee(&mut self, fee_bps: u64) -> Result<()> {
        if self.retired {
            return Err(RegistryError::OperatorRetired(self.address));
        }
        if fee_bps > MAX_FEE_BPS {
            return Err(RegistryError::FeeTooHigh {
                bps: fee_bps,
                max: MAX_FEE_BPS,
            });
        }
        self.fee_bps = fee_bps;
        Ok(())
    }

    /// Terminal: a retired operator never comes back under the same record.
    pub fn retire(&mut self) {
        self.retired = true;
    }
}
