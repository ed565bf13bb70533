//! Off-chain keeper that drives epoch reward distribution: snapshots the
//! ledger at each epoch boundary, builds and freezes the weight table,
//! aggregates eligible stake into reward shares, constructs the Merkle tree
//! and uploads its root chunk by chunk, then publishes a claim artifact.
//!
//! All submission goes through [`SubmissionClient`](tessera_ledger::SubmissionClient),
//! so the same pipeline runs against the in-memory host in tests and an RPC
//! endpoint in production.

pub mod artifact;
pub mod config;
pub mod demo;
pub mod error;
pub mod keeper;
pub mod phase;
pub mod pipeline;
pub mod retry;
pub mod snapshot;

pub use artifact::{ArtifactLeaf, DistributionArtifact};
pub use config::{KeeperConfig, RetrySettings};
pub use error::{KeeperError, Result};
pub use keeper::Keeper;
pub use phase::{EpochPhase, EpochReport};
pub use pipeline::EpochRunner;
pub use retry::with_backoff;
pub use snapshot::{
    FixedWeightOracle, LedgerSnapshot, MemorySnapshotReader, SnapshotReader, WeightOracle,
};
