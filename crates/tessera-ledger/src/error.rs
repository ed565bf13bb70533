use tessera_distributor::DistributorError;
use tessera_registry::RegistryError;
use tessera_types::{Address, Epoch, RecordError};
use tessera_weights::WeightsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Weights(#[from] WeightsError),

    #[error(transparent)]
    Distributor(#[from] DistributorError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("no record at {0}")]
    AccountNotFound(Address),

    #[error("a record already exists at {0}")]
    AccountAlreadyExists(Address),

    #[error("a weight table for epoch {0} already exists")]
    EpochAlreadyInitialized(Epoch),

    #[error("account {0} must sign this instruction")]
    MissingSigner(Address),

    #[error("signer {0} is not authorized for this instruction")]
    Unauthorized(Address),

    #[error("unknown instruction opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("instruction is missing account index {index}")]
    MissingAccount { index: usize },

    #[error("account {found} does not match the derived address {expected}")]
    InvalidDerivedAddress { expected: Address, found: Address },

    #[error("record is bound to epoch {expected}, instruction targets {found}")]
    WrongEpoch { expected: Epoch, found: Epoch },

    #[error("payload codec error: {0}")]
    Payload(String),
}

impl LedgerError {
    /// Stable numeric code for every failure, the shape any caller of the
    /// on-ledger logic consumes. Codes are grouped by origin and never
    /// reused.
    pub fn error_code(&self) -> u32 {
        match self {
            Self::Registry(e) => match e {
                RegistryError::AlreadyActive { .. } => 100,
                RegistryError::NotActive { .. } => 101,
                RegistryError::MintAlreadyRegistered(_) => 102,
                RegistryError::MintNotRegistered(_) => 103,
                RegistryError::VaultAlreadyRegistered(_) => 104,
                RegistryError::RegistryFull { .. } => 105,
                RegistryError::FeeTooHigh { .. } => 106,
                RegistryError::OperatorRetired(_) => 107,
            },
            Self::Weights(e) => match e {
                WeightsError::TableFrozen(_) => 200,
                WeightsError::IncompleteTable { .. } => 201,
                WeightsError::InvalidMint(_) => 202,
                WeightsError::WeightNotFound(_) => 203,
                WeightsError::TableNotFinalized(_) => 204,
                WeightsError::ArithmeticOverflow => 205,
            },
            Self::Distributor(e) => match e {
                DistributorError::EmptyLeaves => 300,
                DistributorError::DuplicateLeaf(_) => 301,
                DistributorError::TooManyLeaves { .. } => 302,
                DistributorError::ZeroChunkSize => 303,
                DistributorError::ChunkOutOfOrder { .. } => 304,
                DistributorError::ChunkSizeMismatch { .. } => 305,
                DistributorError::AlreadyCommitted => 306,
                DistributorError::RootNotCommitted => 307,
                DistributorError::ProofTooDeep(_) => 308,
                DistributorError::ProofMismatch => 309,
                DistributorError::LeafIndexOutOfRange { .. } => 310,
                DistributorError::AlreadyClaimed => 311,
                DistributorError::MaxClaimExceeded { .. } => 312,
                DistributorError::ClaimWindowOpen { .. } => 313,
                DistributorError::AlreadyReclaimed => 314,
                DistributorError::ArithmeticOverflow => 315,
            },
            Self::AccountNotFound(_) => 400,
            Self::AccountAlreadyExists(_) => 401,
            Self::EpochAlreadyInitialized(_) => 402,
            Self::MissingSigner(_) => 403,
            Self::Unauthorized(_) => 404,
            Self::UnknownOpcode(_) => 405,
            Self::MissingAccount { .. } => 406,
            Self::InvalidDerivedAddress { .. } => 407,
            Self::WrongEpoch { .. } => 408,
            Self::Payload(_) => 409,
            Self::Record(e) => match e {
                RecordError::Truncated => 500,
                RecordError::DiscriminatorMismatch { .. } => 501,
                RecordError::Codec(_) => 502,
            },
        }
    }
}
