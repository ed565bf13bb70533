use tessera_types::{Address, Slot};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DistributorError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DistributorError {
    #[error("distribution has no leaves")]
    EmptyLeaves,

    #[error("duplicate leaf for recipient {0}")]
    DuplicateLeaf(Address),

    #[error("leaf count {count} exceeds the maximum of {max}")]
    TooManyLeaves { count: usize, max: usize },

    #[error("chunk size must be non-zero")]
    ZeroChunkSize,

    #[error("chunk out of order: expected index {expected}, got {found}")]
    ChunkOutOfOrder { expected: u64, found: u64 },

    #[error("chunk {index} has {found} bytes, expected {expected}")]
    ChunkSizeMismatch {
        index: u64,
        expected: usize,
        found: usize,
    },

    #[error("distribution root is already committed")]
    AlreadyCommitted,

    #[error("distribution root has not been committed yet")]
    RootNotCommitted,

    #[error("proof depth {0} exceeds the 64-level limit")]
    ProofTooDeep(usize),

    #[error("proof does not match the committed root")]
    ProofMismatch,

    #[error("leaf index {index} is outside the committed node count {max}")]
    LeafIndexOutOfRange { index: u64, max: u64 },

    #[error("reward for this leaf was already claimed")]
    AlreadyClaimed,

    #[error("claim of {amount} would exceed the committed maximum ({claimed} of {max} claimed)")]
    MaxClaimExceeded {
        amount: u64,
        claimed: u64,
        max: u64,
    },

    #[error("claim window is open until slot {until}")]
    ClaimWindowOpen { until: Slot },

    #[error("unclaimed balance was already reclaimed")]
    AlreadyReclaimed,

    #[error("arithmetic overflow while totalling distribution amounts")]
    ArithmeticOverflow,
}
