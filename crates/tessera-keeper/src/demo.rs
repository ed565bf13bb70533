use crate::config::{KeeperConfig, RetrySettings};
use crate::error::{KeeperError, Result};
use crate::pipeline::EpochRunner;
use crate::snapshot::{FixedWeightOracle, MemorySnapshotReader};
use std::sync::Arc;
use tessera_ledger::{instruction, InMemoryLedger, SubmissionClient};
use tessera_registry::{Relation, Vault, VaultRegistry};
use tessera_types::{Address, EpochSchedule, TokenAmount};
use tessera_weights::{StakeDelegation, WEIGHT_PRECISION};
use tokio::sync::watch;
use tracing::info;

/// A self-contained deployment against the in-memory host: one network, one
/// mint, `operator_count` operators each backed by its own vault, every
/// relationship activated at slot 0 and warmed up by the epoch-1 boundary.
///
/// Local testing fixture for the binary and the integration suites; a real
/// deployment replaces the ledger with an RPC client and the reader/oracle
/// with production collaborators.
pub struct Demo {
    pub ledger: InMemoryLedger,
    pub config: KeeperConfig,
    pub network: Address,
    pub authority: Address,
    pub mint: Address,
    pub operators: Vec<Address>,
    pub delegations: Vec<StakeDelegation>,
}

pub fn demo_schedule() -> EpochSchedule {
    EpochSchedule {
        epoch_length_slots: 100,
        warmup_slots: 10,
        cooldown_slots: 10,
        claim_window_slots: 50,
    }
}

impl Demo {
    pub async fn build(operator_count: usize) -> Result<Self> {
        let ledger = InMemoryLedger::new();
        let network = Address::new_unique();
        let authority = Address::new_unique();
        let fee_wallet = Address::new_unique();
        let registry = VaultRegistry::derive_address(&network);
        let mint = Address::new_unique();

        let submit = |ix| {
            let ledger = ledger.clone();
            async move { ledger.submit(&ix).await.map_err(KeeperError::from) }
        };

        submit(instruction::initialize_network(
            network,
            authority,
            fee_wallet,
            100,
            demo_schedule(),
        )?)
        .await?;
        submit(instruction::initialize_vault_registry(
            network, registry, authority,
        ))
        .await?;
        submit(instruction::register_mint(network, registry, authority, mint)?).await?;

        let mut operators = Vec::with_capacity(operator_count);
        let mut delegations = Vec::with_capacity(operator_count);
        for index in 0..operator_count {
            let operator = Address::new_unique();
            let vault = Address::new_unique();
            submit(instruction::register_operator(
                network, operator, authority, 50,
            )?)
            .await?;
            submit(instruction::register_vault(
                network, registry, vault, authority, mint,
            )?)
            .await?;

            for relation in [
                Relation::OperatorNetwork { operator, network },
                Relation::VaultNetwork { vault, network },
                Relation::VaultOperator { vault, operator },
            ] {
                submit(instruction::activate_ticket(network, relation, authority)?).await?;
            }

            // The staking layer is out of scope; the fixture records each
            // vault's delegated total directly, where the snapshot reader
            // picks it up.
            let amount = TokenAmount::new(1_000 * (index as u64 + 1));
            ledger
                .with_state(|state| {
                    let mut record: Vault = state.record(&vault)?;
                    record.set_delegated(amount);
                    state.write_record(vault, &record)
                })
                .await?;

            delegations.push(StakeDelegation {
                vault,
                operator,
                mint,
                amount,
            });
            operators.push(operator);
        }

        // Past the epoch-1 boundary with every warmup complete.
        ledger.set_slot(100).await;
        info!(
            operators = operator_count,
            network = %network,
            "demo deployment ready"
        );

        let config = KeeperConfig {
            network: network.to_hex(),
            authority: authority.to_hex(),
            reward_pool: 1_000_000,
            chunk_size: 8,
            poll_interval_ms: 10,
            artifact_dir: None,
            retry: RetrySettings {
                max_attempts: 3,
                base_delay_ms: 10,
                max_delay_ms: 100,
            },
        };

        Ok(Self {
            ledger,
            config,
            network,
            authority,
            mint,
            operators,
            delegations,
        })
    }

    pub fn snapshot_reader(&self) -> Arc<MemorySnapshotReader> {
        let links = self
            .delegations
            .iter()
            .map(|delegation| (delegation.vault, delegation.operator))
            .collect();
        Arc::new(MemorySnapshotReader::new(self.ledger.clone(), links))
    }

    pub fn oracle(&self) -> Arc<FixedWeightOracle> {
        Arc::new(FixedWeightOracle::new(vec![(self.mint, WEIGHT_PRECISION)]))
    }

    pub fn runner(&self, shutdown: watch::Receiver<bool>) -> EpochRunner {
        EpochRunner::new(
            Arc::new(self.ledger.clone()),
            self.snapshot_reader(),
            self.oracle(),
            self.config.clone(),
            self.network,
            self.authority,
            shutdown,
        )
    }
}
