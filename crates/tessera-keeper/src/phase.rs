use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_types::{Epoch, Slot};

/// Phases of one epoch run, in execution order. Every phase is re-derived
/// from on-ledger records, so a restarted keeper lands in the right one
/// without private checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EpochPhase {
    WaitForEpochBoundary,
    SnapshotLedger,
    BuildWeightTable,
    AggregateStake,
    BuildMerkleTree,
    UploadRootChunks,
    FinalizeDistribution,
    Idle,
}

impl fmt::Display for EpochPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitForEpochBoundary => "wait-for-epoch-boundary",
            Self::SnapshotLedger => "snapshot-ledger",
            Self::BuildWeightTable => "build-weight-table",
            Self::AggregateStake => "aggregate-stake",
            Self::BuildMerkleTree => "build-merkle-tree",
            Self::UploadRootChunks => "upload-root-chunks",
            Self::FinalizeDistribution => "finalize-distribution",
            Self::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// Outcome of one epoch attempt, the diagnostic surface an operator sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: Epoch,
    pub boundary_slot: Slot,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub last_completed_phase: EpochPhase,
    /// Hex of the committed root, when the run got that far.
    pub root: Option<String>,
    /// Failure reason; `None` means the epoch completed.
    pub failure: Option<String>,
}

impl EpochReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}
