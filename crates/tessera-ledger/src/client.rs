use crate::error::LedgerError;
use crate::instruction::Instruction;
use crate::processor::{Outcome, Processor};
use crate::state::LedgerState;
use async_trait::async_trait;
use std::sync::Arc;
use tessera_types::{Address, RecordKind, Slot};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Failure surface of the submission path.
///
/// `Transport` is the retryable class: the instruction may or may not have
/// landed and the caller re-derives its position from on-ledger state before
/// trying again. `Program` carries the typed on-ledger error code; retrying
/// it verbatim can never succeed.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("program error {code}: {message}")]
    Program { code: u32, message: String },
}

impl RpcError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn program_code(&self) -> Option<u32> {
        match self {
            Self::Program { code, .. } => Some(*code),
            Self::Transport(_) => None,
        }
    }
}

impl From<LedgerError> for RpcError {
    fn from(e: LedgerError) -> Self {
        Self::Program {
            code: e.error_code(),
            message: e.to_string(),
        }
    }
}

/// Write/read access to the hosting ledger, as the keeper sees it.
/// Implementations add no retry of their own; retry policy belongs to the
/// caller.
#[async_trait]
pub trait SubmissionClient: Send + Sync {
    async fn submit(&self, instruction: &Instruction) -> Result<Outcome, RpcError>;

    async fn read_record(&self, address: &Address) -> Result<Option<Vec<u8>>, RpcError>;

    async fn current_slot(&self) -> Result<Slot, RpcError>;
}

/// The reference hosting environment: a [`LedgerState`] behind one async
/// mutex, which serializes every mutation exactly the way a single-writer
/// ledger host does.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn advance_slot(&self, by: u64) {
        self.state.lock().await.advance_slot(by);
    }

    pub async fn set_slot(&self, slot: Slot) {
        self.state.lock().await.set_slot(slot);
    }

    /// Snapshot every record of one kind at the current slot. This is the
    /// hook the snapshot-reader collaborator builds on; the keeper itself
    /// never scans the store.
    pub async fn records_of_kind(&self, kind: RecordKind) -> Vec<(Address, Vec<u8>)> {
        self.state.lock().await.records_of_kind(kind)
    }

    /// Run a closure against the locked state. Test and fixture helper.
    pub async fn with_state<R>(&self, f: impl FnOnce(&mut LedgerState) -> R) -> R {
        let mut state = self.state.lock().await;
        f(&mut state)
    }
}

#[async_trait]
impl SubmissionClient for InMemoryLedger {
    async fn submit(&self, instruction: &Instruction) -> Result<Outcome, RpcError> {
        let mut state = self.state.lock().await;
        let outcome = Processor::process(&mut state, instruction)?;
        debug!(opcode = ?instruction.opcode, slot = state.slot(), "instruction applied");
        Ok(outcome)
    }

    async fn read_record(&self, address: &Address) -> Result<Option<Vec<u8>>, RpcError> {
        Ok(self.state.lock().await.raw(address).map(<[u8]>::to_vec))
    }

    async fn current_slot(&self) -> Result<Slot, RpcError> {
        Ok(self.state.lock().await.slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction;
    use tessera_types::EpochSchedule;

    #[tokio::test]
    async fn test_program_errors_carry_codes() {
        let ledger = InMemoryLedger::new();
        let network = Address::new_unique();
        let admin = Address::new_unique();

        let ix = instruction::initialize_network(
            network,
            admin,
            Address::new_unique(),
            100,
            EpochSchedule::default(),
        )
        .unwrap();
        ledger.submit(&ix).await.unwrap();

        // A second initialization is an invariant violation, not retryable.
        let err = ledger.submit(&ix).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.program_code(), Some(401));
    }

    #[tokio::test]
    async fn test_read_record_round_trip() {
        let ledger = InMemoryLedger::new();
        let network = Address::new_unique();
        let ix = instruction::initialize_network(
            network,
            Address::new_unique(),
            Address::new_unique(),
            0,
            EpochSchedule::default(),
        )
        .unwrap();
        ledger.submit(&ix).await.unwrap();

        assert!(ledger.read_record(&network).await.unwrap().is_some());
        assert!(ledger
            .read_record(&Address::new_unique())
            .await
            .unwrap()
            .is_none());
        assert_eq!(ledger.current_slot().await.unwrap(), 0);
        ledger.advance_slot(7).await;
        assert_eq!(ledger.current_slot().await.unwrap(), 7);
    }
}
