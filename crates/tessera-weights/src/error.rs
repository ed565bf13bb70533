use tessera_types::{Address, Epoch};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WeightsError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WeightsError {
    #[error("weight table for epoch {0} is frozen")]
    TableFrozen(Epoch),

    #[error("weight table for epoch {epoch} is missing {missing} of {required} required mints")]
    IncompleteTable {
        epoch: Epoch,
        missing: usize,
        required: usize,
    },

    #[error("mint {0} is not in this epoch's registered set")]
    InvalidMint(Address),

    #[error("no weight set for mint {0}")]
    WeightNotFound(Address),

    #[error("weight table for epoch {0} is not finalized")]
    TableNotFinalized(Epoch),

    #[error("arithmetic overflow in stake weight aggregation")]
    ArithmeticOverflow,
}
