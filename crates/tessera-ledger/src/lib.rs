//! The on-ledger half of the distribution system: a typed instruction
//! surface, the sequential [`Processor`] that executes it against a
//! [`LedgerState`], and the [`SubmissionClient`] seam the keeper drives it
//! through. [`InMemoryLedger`] is the reference host; a deployment swaps in
//! an RPC-backed client behind the same trait.

pub mod client;
pub mod error;
pub mod instruction;
pub mod processor;
pub mod state;

pub use client::{InMemoryLedger, RpcError, SubmissionClient};
pub use error::LedgerError;
pub use instruction::{AccountMeta, Instruction, Opcode};
pub use processor::{Outcome, Processor, Transfer};
pub use state::LedgerState;
