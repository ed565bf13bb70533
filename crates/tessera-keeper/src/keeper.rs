use crate::config::KeeperConfig;
use crate::error::Result;
use crate::phase::EpochReport;
use crate::pipeline::EpochRunner;
use crate::retry::with_backoff;
use crate::snapshot::{SnapshotReader, WeightOracle};
use std::sync::Arc;
use tessera_ledger::SubmissionClient;
use tessera_registry::Network;
use tessera_types::{Address, Epoch, Record};
use tokio::sync::watch;
use tracing::{info, warn};

/// The keeper control loop: watches the slot clock, and once the ledger
/// crosses an epoch boundary runs the distribution pipeline for that epoch.
///
/// One attempt per epoch. A failed epoch stays failed in the report log for
/// an operator to inspect; the loop moves on rather than hammering a broken
/// collaborator. Shutdown is a watch signal checked between phases, so
/// cancellation never leaves on-ledger state inconsistent.
pub struct Keeper {
    client: Arc<dyn SubmissionClient>,
    runner: EpochRunner,
    config: KeeperConfig,
    network: Address,
    shutdown: watch::Receiver<bool>,
    last_attempted: Option<Epoch>,
    reports: Vec<EpochReport>,
}

impl Keeper {
    pub fn new(
        client: Arc<dyn SubmissionClient>,
        snapshots: Arc<dyn SnapshotReader>,
        oracle: Arc<dyn WeightOracle>,
        config: KeeperConfig,
        network: Address,
        authority: Address,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let runner = EpochRunner::new(
            Arc::clone(&client),
            snapshots,
            oracle,
            config.clone(),
            network,
            authority,
            shutdown.clone(),
        );
        Self {
            client,
            runner,
            config,
            network,
            shutdown,
            last_attempted: None,
            reports: Vec::new(),
        }
    }

    pub fn reports(&self) -> &[EpochReport] {
        &self.reports
    }

    pub fn last_report(&self) -> Option<&EpochReport> {
        self.reports.last()
    }

    /// Run until shutdown. Position is re-derived every iteration from the
    /// ledger clock, so a restarted keeper picks up the current epoch and
    /// the pipeline's own resume logic does the rest.
    pub async fn run(&mut self) -> Result<()> {
        info!(network = %self.network, "keeper loop started");
        loop {
            if *self.shutdown.borrow() {
                info!("keeper loop stopping");
                return Ok(());
            }

            let slot = with_backoff(&self.config.retry, "current-slot", || async {
                Ok(self.client.current_slot().await?)
            })
            .await?;
            let network: Network = {
                let bytes = with_backoff(&self.config.retry, "read-network", || async {
                    Ok(self.client.read_record(&self.network).await?)
                })
                .await?;
                match bytes {
                    Some(bytes) => Network::decode(&bytes)?,
                    None => {
                        warn!(network = %self.network, "network record not found yet");
                        self.idle().await;
                        continue;
                    }
                }
            };

            let epoch = network.schedule().epoch_for_slot(slot);
            if epoch >= 1 && self.last_attempted != Some(epoch) {
                info!(epoch, slot, "epoch boundary crossed, running distribution");
                let report = self.runner.run_epoch(epoch).await;
                if let Some(reason) = &report.failure {
                    warn!(
                        epoch,
                        last_completed = %report.last_completed_phase,
                        reason,
                        "epoch attempt failed; operator attention required"
                    );
                }
                self.last_attempted = Some(epoch);
                self.reports.push(report);
            } else {
                self.idle().await;
            }
        }
    }

    async fn idle(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.poll_interval()) => {}
            _ = self.shutdown.changed() => {}
        }
    }
}
