//! Persistent registry records for the reward distribution core: the
//! coordinating [`Network`], participating [`Operator`]s, stake-holding
//! [`Vault`]s, the per-network [`VaultRegistry`] of supported mints, and the
//! relationship [`Ticket`] lifecycle that gates per-epoch eligibility.
//!
//! Records here are pure data plus invariant checks; epoch algorithms live in
//! the weights and distributor crates.

pub mod error;
pub mod network;
pub mod operator;
pub mod relation;
pub mod ticket;
pub mod vault;
pub mod vault_registry;

pub use error::RegistryError;
pub use network::Network;
pub use operator::Operator;
pub use relation::{Relation, RelationKind};
pub use ticket::{Ticket, TicketBook, TicketState};
pub use vault::Vault;
pub use vault_registry::{MintEntry, VaultEntry, VaultRegistry};
