use crate::error::{KeeperError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tessera_ledger::{InMemoryLedger, SubmissionClient};
use tessera_registry::{Ticket, Vault};
use tessera_types::{Address, Record, RecordKind, Slot};
use tessera_weights::StakeDelegation;
use tracing::debug;

/// Raw per-epoch inputs extracted from the ledger at one pinned slot.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    /// The slot this snapshot is pinned to. The pipeline refuses any value
    /// other than the exact epoch boundary.
    pub slot: Slot,
    pub tickets: Vec<Ticket>,
    pub delegations: Vec<StakeDelegation>,
}

/// Off-chain reader extracting stake and relationship data at a target
/// height. A reader that cannot serve the requested slot yet returns
/// [`KeeperError::SnapshotUnavailable`], which the pipeline retries against
/// later availability of the SAME slot, never a substitute slot.
#[async_trait]
pub trait SnapshotReader: Send + Sync {
    async fn snapshot(&self, at_slot: Slot) -> Result<LedgerSnapshot>;
}

/// External oracle supplying per-mint weights for the epoch's table.
#[async_trait]
pub trait WeightOracle: Send + Sync {
    async fn mint_weights(&self) -> Result<Vec<(Address, u128)>>;
}

/// Snapshot reader over the in-memory host ledger. Ticket records come
/// straight off the ledger; delegation amounts are read from each linked
/// vault's recorded total, so the ledger stays the single source of truth.
pub struct MemorySnapshotReader {
    ledger: InMemoryLedger,
    links: Arc<Vec<(Address, Address)>>,
}

impl MemorySnapshotReader {
    /// `links` pairs each vault with the operator its stake backs.
    pub fn new(ledger: InMemoryLedger, links: Vec<(Address, Address)>) -> Self {
        Self {
            ledger,
            links: Arc::new(links),
        }
    }
}

#[async_trait]
impl SnapshotReader for MemorySnapshotReader {
    async fn snapshot(&self, at_slot: Slot) -> Result<LedgerSnapshot> {
        let current = self
            .ledger
            .current_slot()
            .await
            .map_err(KeeperError::from)?;
        if current < at_slot {
            return Err(KeeperError::SnapshotUnavailable(format!(
                "ledger at slot {current}, boundary {at_slot} not reached"
            )));
        }

        let mut tickets = Vec::new();
        for (_, bytes) in self.ledger.records_of_kind(RecordKind::Ticket).await {
            tickets.push(Ticket::decode(&bytes)?);
        }

        let mut delegations = Vec::with_capacity(self.links.len());
        for (vault_address, operator) in self.links.iter() {
            let bytes = self
                .ledger
                .read_record(vault_address)
                .await
                .map_err(KeeperError::from)?
                .ok_or(KeeperError::MissingRecord(*vault_address))?;
            let vault = Vault::decode(&bytes)?;
            delegations.push(StakeDelegation {
                vault: *vault_address,
                operator: *operator,
                mint: vault.mint(),
                amount: vault.delegated(),
            });
        }

        debug!(
            slot = at_slot,
            tickets = tickets.len(),
            delegations = delegations.len(),
            "ledger snapshot taken"
        );
        Ok(LedgerSnapshot {
            slot: at_slot,
            tickets,
            delegations,
        })
    }
}

/// Constant-weight oracle; the production counterpart is a price feed.
pub struct FixedWeightOracle {
    weights: Vec<(Address, u128)>,
}

impl FixedWeightOracle {
    pub fn new(weights: Vec<(Address, u128)>) -> Self {
        Self { weights }
    }
}

#[async_trait]
impl WeightOracle for FixedWeightOracle {
    async fn mint_weights(&self) -> Result<Vec<(Address, u128)>> {
        Ok(self.weights.clone())
    }
}
