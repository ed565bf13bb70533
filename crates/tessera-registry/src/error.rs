use tessera_types::Address;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("ticket for {relation} is already active")]
    AlreadyActive { relation: String },

    #[error("ticket for {relation} is not active")]
    NotActive { relation: String },

    #[error("mint {0} is already registered")]
    MintAlreadyRegistered(Address),

    #[error("mint {0} is not registered")]
    MintNotRegistered(Address),

    #[error("vault {0} is already registered")]
    VaultAlreadyRegistered(Address),

    #[error("registry is full ({capacity} entries)")]
    RegistryFull { capacity: usize },

    #[error("fee of {bps} bps exceeds the maximum of {max} bps")]
    FeeTooHigh { bps: u64, max: u64 },

    #[error("operator {0} has been retired")]
    OperatorRetired(Address),
}
