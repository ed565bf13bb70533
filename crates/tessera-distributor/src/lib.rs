//! Tamper-evident reward distribution.
//!
//! The keeper builds a [`MerkleTree`] over the epoch's `(recipient, amount)`
//! leaves off-chain, commits its root into a [`DistributionRoot`] record
//! through the ordered chunk-upload protocol, and recipients later prove
//! membership with a [`ClaimProof`] verified against the committed root;
//! nobody re-trusts the party that computed the tree.

pub mod error;
pub mod root;
pub mod tree;

pub use error::DistributorError;
pub use root::{
    chunk_count, root_chunks, ClaimReceipt, DistributionRoot, DEFAULT_CHUNK_SIZE, ROOT_LEN,
};
pub use tree::{
    derive_salt, fold_proof, leaf_hash, ClaimProof, MerkleTree, RewardLeaf, MAX_LEAVES,
};
