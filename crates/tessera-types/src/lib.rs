pub mod address;
pub mod amount;
pub mod progress;
pub mod record;
pub mod schedule;

pub use address::Address;
pub use amount::TokenAmount;
pub use progress::{Progress, ProgressError};
pub use record::{peek_kind, Record, RecordError, RecordKind};
pub use schedule::{Epoch, EpochSchedule, Slot};
