use crate::artifact::DistributionArtifact;
use crate::config::KeeperConfig;
use crate::error::{KeeperError, Result};
use crate::phase::{EpochPhase, EpochReport};
use crate::retry::with_backoff;
use crate::snapshot::{LedgerSnapshot, SnapshotReader, WeightOracle};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_distributor::{
    derive_salt, root_chunks, DistributionRoot, MerkleTree, RewardLeaf,
};
use tessera_ledger::{instruction, Instruction, SubmissionClient};
use tessera_registry::{Network, TicketBook, VaultRegistry};
use tessera_types::{Address, Epoch, EpochSchedule, Record, Slot, TokenAmount};
use tessera_weights::{
    reward_shares, OperatorStake, RewardShare, StakeAggregator, StakeDelegation, WeightTable,
    WeightsError,
};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Program codes the pipeline treats as "already applied" when resuming:
/// the record-level refusals a previous run's landed instruction produces.
const TOLERATE_TABLE_EXISTS: &[u32] = &[402];
const TOLERATE_TABLE_FROZEN: &[u32] = &[200];
const TOLERATE_DIST_EXISTS: &[u32] = &[401];
const TOLERATE_CHUNK_LANDED: &[u32] = &[304];

/// Drives one epoch end to end: snapshot, weight table, stake aggregation,
/// tree construction, ordered root upload, artifact.
///
/// Every phase re-derives its position from on-ledger records, so a crashed
/// keeper restarts into the same epoch and resumes: mid-upload it continues
/// at the on-ledger tally, never re-counting chunks. The submission phase is
/// strictly ordered; only the read-only stake aggregation fans out.
pub struct EpochRunner {
    client: Arc<dyn SubmissionClient>,
    snapshots: Arc<dyn SnapshotReader>,
    oracle: Arc<dyn WeightOracle>,
    config: KeeperConfig,
    network: Address,
    authority: Address,
    shutdown: watch::Receiver<bool>,
}

impl EpochRunner {
    pub fn new(
        client: Arc<dyn SubmissionClient>,
        snapshots: Arc<dyn SnapshotReader>,
        oracle: Arc<dyn WeightOracle>,
        config: KeeperConfig,
        network: Address,
        authority: Address,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            snapshots,
            oracle,
            config,
            network,
            authority,
            shutdown,
        }
    }

    fn checkpoint(&self) -> Result<()> {
        if *self.shutdown.borrow() {
            Err(KeeperError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn read_record<T: Record>(&self, address: &Address) -> Result<Option<T>> {
        let bytes = with_backoff(&self.config.retry, "read-record", || async {
            self.client
                .read_record(address)
                .await
                .map_err(KeeperError::from)
        })
        .await?;
        match bytes {
            None => Ok(None),
            Some(bytes) => Ok(Some(T::decode(&bytes)?)),
        }
    }

    async fn require_record<T: Record>(&self, address: &Address) -> Result<T> {
        self.read_record(address)
            .await?
            .ok_or(KeeperError::MissingRecord(*address))
    }

    /// Submit with transport retry; a tolerated program code means a prior
    /// attempt (possibly of a previous keeper run) already landed this
    /// instruction.
    async fn submit(&self, ix: &Instruction, label: &str, tolerated: &[u32]) -> Result<()> {
        let result = with_backoff(&self.config.retry, label, || async {
            self.client
                .submit(ix)
                .await
                .map(|_| ())
                .map_err(KeeperError::from)
        })
        .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.program_code().is_some_and(|c| tolerated.contains(&c)) => {
                debug!(label, code = ?e.program_code(), "instruction already applied");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Run one epoch and report the outcome, including how far it got.
    pub async fn run_epoch(&self, epoch: Epoch) -> EpochReport {
        let started_at = Utc::now();
        let mut phase = EpochPhase::WaitForEpochBoundary;
        let mut boundary_slot = 0;
        let mut root = None;

        let failure = match self
            .drive(epoch, &mut phase, &mut boundary_slot, &mut root)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                error!(epoch, last_completed = %phase, error = %e, "epoch run failed");
                Some(e.to_string())
            }
        };
        EpochReport {
            epoch,
            boundary_slot,
            started_at,
            finished_at: Utc::now(),
            last_completed_phase: phase,
            root,
            failure,
        }
    }

    async fn drive(
        &self,
        epoch: Epoch,
        phase: &mut EpochPhase,
        boundary_out: &mut Slot,
        root_out: &mut Option<String>,
    ) -> Result<()> {
        let network: Network = self.require_record(&self.network).await?;
        let schedule = network.schedule();
        let boundary_slot = schedule
            .start_slot(epoch)
            .ok_or(KeeperError::EpochOutOfRange(epoch))?;
        *boundary_out = boundary_slot;

        self.wait_for_boundary(boundary_slot).await?;
        *phase = EpochPhase::WaitForEpochBoundary;
        self.checkpoint()?;

        let snapshot = self.snapshot_ledger(boundary_slot).await?;
        *phase = EpochPhase::SnapshotLedger;
        self.checkpoint()?;

        let table = self.build_weight_table(epoch).await?;
        *phase = EpochPhase::BuildWeightTable;
        self.checkpoint()?;

        let shares = self
            .aggregate_stake(boundary_slot, &schedule, &snapshot, table)
            .await?;
        *phase = EpochPhase::AggregateStake;
        self.checkpoint()?;

        if shares.is_empty() {
            info!(epoch, "no eligible stake; nothing to distribute");
            *phase = EpochPhase::Idle;
            return Ok(());
        }

        let tree = self.build_tree(epoch, &shares)?;
        *phase = EpochPhase::BuildMerkleTree;
        self.checkpoint()?;

        let distribution = self.upload_root(epoch, &tree).await?;
        *phase = EpochPhase::UploadRootChunks;
        self.checkpoint()?;

        let committed = distribution.committed_root()?;
        if committed != tree.root() {
            return Err(KeeperError::RootMismatch {
                expected: hex::encode(tree.root()),
                found: hex::encode(committed),
            });
        }
        *root_out = Some(hex::encode(committed));
        if let Some(dir) = &self.config.artifact_dir {
            DistributionArtifact::from_tree(&self.network, epoch, boundary_slot, &tree)
                .write_to_dir(dir)?;
        }
        *phase = EpochPhase::FinalizeDistribution;

        info!(
            epoch,
            root = hex::encode(committed),
            leaves = tree.leaf_count(),
            "epoch distribution complete"
        );
        *phase = EpochPhase::Idle;
        Ok(())
    }

    async fn wait_for_boundary(&self, boundary_slot: Slot) -> Result<()> {
        with_backoff(&self.config.retry, "wait-epoch-boundary", || async {
            let slot = self.client.current_slot().await?;
            if slot < boundary_slot {
                Err(KeeperError::SnapshotUnavailable(format!(
                    "slot {slot} has not reached boundary {boundary_slot}"
                )))
            } else {
                Ok(())
            }
        })
        .await
    }

    /// Pin the snapshot to the exact boundary slot. Availability is retried;
    /// a reader that answers with ANY other slot is a consistency fault for
    /// this attempt, never papered over with the slot it offered.
    async fn snapshot_ledger(&self, boundary_slot: Slot) -> Result<LedgerSnapshot> {
        let snapshot = with_backoff(&self.config.retry, "snapshot-ledger", || async {
            self.snapshots.snapshot(boundary_slot).await
        })
        .await?;
        if snapshot.slot != boundary_slot {
            return Err(KeeperError::SnapshotSlotMismatch {
                expected: boundary_slot,
                found: snapshot.slot,
            });
        }
        Ok(snapshot)
    }

    async fn build_weight_table(&self, epoch: Epoch) -> Result<WeightTable> {
        let table_address = WeightTable::derive_address(&self.network, epoch);
        let registry_address = VaultRegistry::derive_address(&self.network);

        if self
            .read_record::<WeightTable>(&table_address)
            .await?
            .is_none()
        {
            let ix = instruction::initialize_weight_table(
                self.network,
                registry_address,
                table_address,
                self.authority,
                epoch,
            )?;
            self.submit(&ix, "init-weight-table", TOLERATE_TABLE_EXISTS)
                .await?;
        }

        let table: WeightTable = self.require_record(&table_address).await?;
        if table.is_finalized() {
            debug!(epoch, "weight table already frozen, resuming past it");
            return Ok(table);
        }

        let weights = with_backoff(&self.config.retry, "weight-oracle", || async {
            self.oracle.mint_weights().await
        })
        .await?;
        for (mint, weight) in weights {
            if !table.required_mints().contains(&mint) {
                debug!(mint = %mint, "oracle weight for unregistered mint ignored");
                continue;
            }
            let ix = instruction::set_weight(
                self.network,
                table_address,
                self.authority,
                mint,
                weight,
            )?;
            self.submit(&ix, "set-weight", TOLERATE_TABLE_FROZEN).await?;
        }

        let ix = instruction::finalize_weight_table(self.network, table_address, self.authority);
        self.submit(&ix, "finalize-weight-table", TOLERATE_TABLE_FROZEN)
            .await?;

        let table: WeightTable = self.require_record(&table_address).await?;
        if !table.is_finalized() {
            return Err(WeightsError::TableNotFinalized(epoch).into());
        }
        Ok(table)
    }

    /// Fold snapshot delegations into reward shares. Aggregation is
    /// read-only, so disjoint mints fan out across worker tasks; the merge
    /// keeps the checked-arithmetic guarantee.
    async fn aggregate_stake(
        &self,
        boundary_slot: Slot,
        schedule: &EpochSchedule,
        snapshot: &LedgerSnapshot,
        table: WeightTable,
    ) -> Result<Vec<RewardShare>> {
        let mut book = TicketBook::new();
        for ticket in &snapshot.tickets {
            book.insert(*ticket);
        }
        let book = Arc::new(book);
        let table = Arc::new(table);
        let schedule = *schedule;

        let mut groups: BTreeMap<Address, Vec<StakeDelegation>> = BTreeMap::new();
        for delegation in &snapshot.delegations {
            groups.entry(delegation.mint).or_default().push(*delegation);
        }

        let handles: Vec<_> = groups
            .into_values()
            .map(|group| {
                let book = Arc::clone(&book);
                let table = Arc::clone(&table);
                tokio::spawn(async move {
                    let aggregator =
                        StakeAggregator::new(boundary_slot, &schedule, &book, &table)?;
                    aggregator.aggregate(&group)
                })
            })
            .collect();

        let mut totals: BTreeMap<Address, u128> = BTreeMap::new();
        for joined in futures::future::try_join_all(handles)
            .await
            .map_err(|e| KeeperError::Task(e.to_string()))?
        {
            for stake in joined? {
                let total = totals.entry(stake.operator).or_insert(0);
                *total = total
                    .checked_add(stake.stake_weight)
                    .ok_or(WeightsError::ArithmeticOverflow)?;
            }
        }

        let stakes: Vec<OperatorStake> = totals
            .into_iter()
            .map(|(operator, stake_weight)| OperatorStake {
                operator,
                stake_weight,
            })
            .collect();
        Ok(reward_shares(
            TokenAmount::new(self.config.reward_pool),
            &stakes,
        )?)
    }

    fn build_tree(&self, epoch: Epoch, shares: &[RewardShare]) -> Result<MerkleTree> {
        let salt = derive_salt(&self.network, epoch);
        let leaves = shares
            .iter()
            .map(|share| RewardLeaf {
                recipient: share.operator,
                amount: share.amount,
            })
            .collect();
        Ok(MerkleTree::build(leaves, salt)?)
    }

    /// Ordered chunk upload, resuming at the on-ledger tally. Chunk `k+1`
    /// is only submitted after `k`'s acceptance is observed by re-reading
    /// the record.
    async fn upload_root(&self, epoch: Epoch, tree: &MerkleTree) -> Result<DistributionRoot> {
        let distribution_address = DistributionRoot::derive_address(&self.network, epoch);
        let table_address = WeightTable::derive_address(&self.network, epoch);

        if self
            .read_record::<DistributionRoot>(&distribution_address)
            .await?
            .is_none()
        {
            let ix = instruction::initialize_distribution(
                self.network,
                table_address,
                distribution_address,
                self.authority,
                instruction::InitializeDistributionPayload {
                    epoch,
                    max_total_claim: tree.total_amount()?,
                    max_num_nodes: tree.leaf_count(),
                    chunk_size: self.config.chunk_size as u32,
                },
            )?;
            self.submit(&ix, "init-distribution", TOLERATE_DIST_EXISTS)
                .await?;
        }

        let mut distribution: DistributionRoot =
            self.require_record(&distribution_address).await?;
        // The record's chunk size wins over config so a reconfigured keeper
        // still resumes a half-uploaded root correctly.
        let chunks = root_chunks(&tree.root(), distribution.chunk_size())?;

        while !distribution.is_committed() {
            self.checkpoint()?;
            let next = distribution.upload_progress().tally();
            let ix = instruction::upload_merkle_root_chunk(
                self.network,
                distribution_address,
                self.authority,
                next,
                chunks[next as usize].clone(),
            )?;
            self.submit(&ix, "upload-root-chunk", TOLERATE_CHUNK_LANDED)
                .await?;

            let refreshed: DistributionRoot =
                self.require_record(&distribution_address).await?;
            if !refreshed.is_committed() && refreshed.upload_progress().tally() <= next {
                return Err(KeeperError::UploadStalled { chunk: next });
            }
            debug!(
                epoch,
                chunk = next,
                tally = refreshed.upload_progress().tally(),
                of = refreshed.upload_progress().total(),
                "chunk acceptance observed"
            );
            distribution = refreshed;
        }
        Ok(distribution)
    }
}
