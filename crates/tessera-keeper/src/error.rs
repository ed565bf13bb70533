use tessera_distributor::DistributorError;
use tessera_ledger::{LedgerError, RpcError};
use tessera_types::{Address, RecordError, Slot};
use tessera_weights::WeightsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeeperError>;

#[derive(Debug, Error)]
pub enum KeeperError {
    /// The snapshot source served a different slot than the epoch boundary.
    /// Fatal for the attempt: a stale snapshot must never be silently used.
    #[error("snapshot pinned to slot {found}, epoch boundary is slot {expected}")]
    SnapshotSlotMismatch { expected: Slot, found: Slot },

    #[error("snapshot not yet available: {0}")]
    SnapshotUnavailable(String),

    #[error("weight oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Weights(#[from] WeightsError),

    #[error(transparent)]
    Distributor(#[from] DistributorError),

    #[error("{label} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        last: String,
    },

    #[error("expected record missing at {0}")]
    MissingRecord(Address),

    #[error("committed root {found} disagrees with the locally built root {expected}")]
    RootMismatch { expected: String, found: String },

    #[error("epoch {0} has no representable boundary slot")]
    EpochOutOfRange(u64),

    #[error("upload of chunk {chunk} made no on-ledger progress")]
    UploadStalled { chunk: u64 },

    #[error("shutdown requested")]
    Cancelled,

    #[error("worker task failed: {0}")]
    Task(String),

    #[error("artifact io error: {0}")]
    ArtifactIo(#[from] std::io::Error),

    #[error("artifact codec error: {0}")]
    ArtifactCodec(#[from] serde_json::Error),
}

impl KeeperError {
    /// Only external I/O faults are retried; invariant violations and
    /// consistency faults surface immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SnapshotUnavailable(_) | Self::OracleUnavailable(_) => true,
            Self::Rpc(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Program error code, when the failure was a typed on-ledger refusal.
    pub fn program_code(&self) -> Option<u32> {
        match self {
            Self::Rpc(e) => e.program_code(),
            Self::Ledger(e) => Some(e.error_code()),
            _ => None,
        }
    }
}
