use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_types::Address;

/// The three relationship kinds that can hold a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationKind {
    OperatorNetwork,
    VaultNetwork,
    VaultOperator,
}

impl RelationKind {
    pub const fn tag(self) -> u8 {
        match self {
            Self::OperatorNetwork => 0,
            Self::VaultNetwork => 1,
            Self::VaultOperator => 2,
        }
    }
}

/// A relationship between two registry entities, used as the key of the
/// ticket store. The variant fixes both the kind and the role of each
/// address, so `(a, b)` ordering is never ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Relation {
    OperatorNetwork { operator: Address, network: Address },
    VaultNetwork { vault: Address, network: Address },
    VaultOperator { vault: Address, operator: Address },
}

impl Relation {
    pub const fn kind(&self) -> RelationKind {
        match self {
            Self::OperatorNetwork { .. } => RelationKind::OperatorNetwork,
            Self::VaultNetwork { .. } => RelationKind::VaultNetwork,
            Self::VaultOperator { .. } => RelationKind::VaultOperator,
        }
    }

    /// The two related entities in declared order.
    pub const fn parties(&self) -> (Address, Address) {
        match *self {
            Self::OperatorNetwork { operator, network } => (operator, network),
            Self::VaultNetwork { vault, network } => (vault, network),
            Self::VaultOperator { vault, operator } => (vault, operator),
        }
    }

    /// Deterministic ticket record address for this relation, derived the
    /// same way on every node: a domain prefix, the kind tag and both
    /// parties feed a blake3 hash.
    pub fn ticket_address(&self) -> Address {
        let (a, b) = self.parties();
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tessera:ticket");
        hasher.update(&[self.kind().tag()]);
        hasher.update(a.as_bytes());
        hasher.update(b.as_bytes());
        Address::from_bytes(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorNetwork { operator, network } => {
                write!(f, "operator {} <-> network {}", operator, network)
            }
            Self::VaultNetwork { vault, network } => {
                write!(f, "vault {} <-> network {}", vault, network)
            }
            Self::VaultOperator { vault, operator } => {
                write!(f, "vault {} <-> operator {}", vault, operator)
            }
        }
    }
}
