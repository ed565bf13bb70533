//! Per-epoch weight tables and eligible-stake aggregation.
//!
//! Each epoch gets exactly one [`WeightTable`]: an auditable mint → weight
//! snapshot that is append-only while open and immutable once finalized. The
//! [`StakeAggregator`] then folds ledger-snapshot delegations through the
//! ticket eligibility rules and the frozen weights into per-operator stake,
//! and [`reward_shares`] turns that stake into the distribution leaves.

pub mod aggregate;
pub mod error;
pub mod table;

pub use aggregate::{reward_shares, OperatorStake, RewardShare, StakeAggregator, StakeDelegation};
pub use error::WeightsError;
pub use table::{WeightEntry, WeightTable, WEIGHT_PRECISION};
