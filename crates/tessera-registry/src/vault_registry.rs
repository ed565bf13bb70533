use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use tessera_types::{Address, Record, RecordKind, Slot};
use tracing::info;

/// A supported mint registered with the network. Weights may only be set for
/// registered mints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintEntry {
    mint: Address,
    registered_at: Slot,
    reserved: [u8; 16],
}

impl MintEntry {
    pub fn new(mint: Address, registered_at: Slot) -> Self {
        Self {
            mint,
            registered_at,
            reserved: [0; 16],
        }
    }

    pub const fn mint(&self) -> Address {
        self.mint
    }

    pub const fn registered_at(&self) -> Slot {
        self.registered_at
    }
}

/// A vault registered with the network, bound to its supported mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    vault: Address,
    mint: Address,
    index: u64,
    registered_at: Slot,
    reserved: [u8; 16],
}

impl VaultEntry {
    pub fn new(vault: Address, mint: Address, index: u64, registered_at: Slot) -> Self {
        Self {
            vault,
            mint,
            index,
            registered_at,
            reserved: [0; 16],
        }
    }

    pub const fn vault(&self) -> Address {
        self.vault
    }

    pub const fn mint(&self) -> Address {
        self.mint
    }

    pub const fn index(&self) -> u64 {
        self.index
    }
}

/// Per-network registry of supported mints and the vaults that hold them.
/// Entries append in registration order and are never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRegistry {
    pub network: Address,
    mints: Vec<MintEntry>,
    vaults: Vec<VaultEntry>,
    reserved: [u8; 32],
}

impl Record for VaultRegistry {
    const KIND: RecordKind = RecordKind::VaultRegistry;
}

impl VaultRegistry {
    pub const MAX_MINTS: usize = 64;
    pub const MAX_VAULTS: usize = 256;

    pub fn new(network: Address) -> Self {
        Self {
            network,
            mints: Vec::new(),
            vaults: Vec::new(),
            reserved: [0; 32],
        }
    }

    /// Deterministic registry record address for a network.
    pub fn derive_address(network: &Address) -> Address {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tessera:vault_registry");
        hasher.update(network.as_bytes());
        Address::from_bytes(*hasher.finalize().as_bytes())
    }

    pub fn has_mint(&self, mint: &Address) -> bool {
        self.mints.iter().any(|entry| entry.mint() == *mint)
    }

    pub fn check_mint(&self, mint: &Address) -> Result<()> {
        if self.has_mint(mint) {
            Ok(())
        } else {
            Err(RegistryError::MintNotRegistered(*mint))
        }
    }

    pub fn register_mint(&mut self, mint: Address, current_slot: Slot) -> Result<()> {
        if self.has_mint(&mint) {
            return Err(RegistryError::MintAlreadyRegistered(mint));
        }
        if self.mints.len() >= Self::MAX_MINTS {
            return Err(RegistryError::RegistryFull {
                capacity: Self::MAX_MINTS,
            });
        }
        self.mints.push(MintEntry::new(mint, current_slot));
        info!(mint = %mint, slot = current_slot, "mint registered");
        Ok(())
    }

    pub fn register_vault(
        &mut self,
        vault: Address,
        mint: Address,
        current_slot: Slot,
    ) -> Result<()> {
        self.check_mint(&mint)?;
        if self.vaults.iter().any(|entry| entry.vault() == vault) {
            return Err(RegistryError::VaultAlreadyRegistered(vault));
        }
        if self.vaults.len() >= Self::MAX_VAULTS {
            return Err(RegistryError::RegistryFull {
                capacity: Self::MAX_VAULTS,
            });
        }
        let index = self.vaults.len() as u64;
        self.vaults.push(VaultEntry::new(vault, mint, index, current_slot));
        info!(vault = %vault, mint = %mint, index, "vault registered");
        Ok(())
    }

    /// Registered mints in registration order; the required set for a
    /// complete weight table.
    pub fn mints(&self) -> impl Iterator<Item = Address> + '_ {
        self.mints.iter().map(|entry| entry.mint())
    }

    pub fn mint_entries(&self) -> &[MintEntry] {
        &self.mints
    }

    pub fn vault_entries(&self) -> &[VaultEntry] {
        &self.vaults
    }

    pub fn mint_count(&self) -> usize {
        self.mints.len()
    }

    pub fn vault_count(&self) -> usize {
        self.vaults.len()
    }
}
