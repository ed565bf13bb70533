use crate::error::{DistributorError, Result};
use crate::tree::{fold_proof, leaf_hash, ClaimProof, RewardLeaf};
use serde::{Deserialize, Serialize};
use tessera_types::{Address, Epoch, Progress, ProgressError, Record, RecordKind, Slot, TokenAmount};
use tracing::{debug, info, warn};

/// The committed root is always 32 bytes; chunking exists for transports
/// whose payload ceiling sits below that.
pub const ROOT_LEN: usize = 32;

/// Default upload chunk size. A protocol parameter, not a transport
/// constant; deployments size it to their payload limit.
pub const DEFAULT_CHUNK_SIZE: usize = 8;

/// Number of chunks a root splits into at `chunk_size`.
pub fn chunk_count(chunk_size: usize) -> Result<u64> {
    if chunk_size == 0 {
        return Err(DistributorError::ZeroChunkSize);
    }
    Ok(ROOT_LEN.div_ceil(chunk_size) as u64)
}

/// Split a root into its ordered upload chunks. Every chunk is full length
/// except possibly the last.
pub fn root_chunks(root: &[u8; ROOT_LEN], chunk_size: usize) -> Result<Vec<Vec<u8>>> {
    if chunk_size == 0 {
        return Err(DistributorError::ZeroChunkSize);
    }
    Ok(root.chunks(chunk_size).map(<[u8]>::to_vec).collect())
}

/// Outcome of a successful claim; the host moves the funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub recipient: Address,
    pub amount: TokenAmount,
    pub leaf_index: u64,
}

/// The per-epoch distribution commitment.
///
/// Created once the epoch's weight table freezes, filled by the ordered
/// chunk-upload protocol, then immutable: after `upload` completes the root
/// never changes and only claims and the post-window reclaim touch the
/// record. Claim accounting reuses [`Progress`] with the tally in token
/// units against `max_total_claim`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRoot {
    pub network: Address,
    pub epoch: Epoch,
    salt: [u8; 32],
    max_num_nodes: u64,
    chunk_size: u32,
    buffer: Vec<u8>,
    upload: Progress,
    merkle_root: [u8; 32],
    committed_at: Option<Slot>,
    claimed_bitmap: Vec<u8>,
    claimed: Progress,
    reclaimed: bool,
    reserved: [u8; 32],
}

impl Record for DistributionRoot {
    const KIND: RecordKind = RecordKind::DistributionRoot;
}

impl DistributionRoot {
    pub fn new(
        network: Address,
        epoch: Epoch,
        salt: [u8; 32],
        max_total_claim: TokenAmount,
        max_num_nodes: u64,
        chunk_size: usize,
    ) -> Result<Self> {
        let chunks = chunk_count(chunk_size)?;
        let bitmap_len = (max_num_nodes as usize).div_ceil(8);
        Ok(Self {
            network,
            epoch,
            salt,
            max_num_nodes,
            chunk_size: chunk_size as u32,
            buffer: Vec::with_capacity(ROOT_LEN),
            upload: Progress::new(chunks),
            merkle_root: [0; 32],
            committed_at: None,
            claimed_bitmap: vec![0; bitmap_len],
            claimed: Progress::new(max_total_claim.units()),
            reclaimed: false,
            reserved: [0; 32],
        })
    }

    /// Deterministic distribution record address for `(network, epoch)`.
    pub fn derive_address(network: &Address, epoch: Epoch) -> Address {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tessera:distribution_root");
        hasher.update(network.as_bytes());
        hasher.update(&epoch.to_le_bytes());
        Address::from_bytes(*hasher.finalize().as_bytes())
    }

    pub fn salt(&self) -> [u8; 32] {
        self.salt
    }

    pub fn max_total_claim(&self) -> TokenAmount {
        TokenAmount::new(self.claimed.total())
    }

    pub fn max_num_nodes(&self) -> u64 {
        self.max_num_nodes
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size as usize
    }

    pub fn upload_progress(&self) -> Progress {
        self.upload
    }

    pub fn claimed_amount(&self) -> TokenAmount {
        TokenAmount::new(self.claimed.tally())
    }

    pub fn is_committed(&self) -> bool {
        self.committed_at.is_some()
    }

    pub fn committed_at(&self) -> Option<Slot> {
        self.committed_at
    }

    pub fn is_reclaimed(&self) -> bool {
        self.reclaimed
    }

    pub fn committed_root(&self) -> Result<[u8; 32]> {
        if self.is_committed() {
            Ok(self.merkle_root)
        } else {
            Err(DistributorError::RootNotCommitted)
        }
    }

    fn expected_chunk_len(&self, index: u64) -> usize {
        let offset = index as usize * self.chunk_size();
        (ROOT_LEN - offset).min(self.chunk_size())
    }

    /// Accept the next root chunk. Strictly ordered: anything but
    /// `upload.tally` is rejected, so a re-submitted or duplicated chunk can
    /// never double-count. The final chunk commits the root.
    pub fn upload_chunk(&mut self, index: u64, bytes: &[u8], current_slot: Slot) -> Result<()> {
        if self.is_committed() {
            return Err(DistributorError::AlreadyCommitted);
        }
        let expected = self.upload.tally();
        if index != expected {
            warn!(
                epoch = self.epoch,
                expected,
                found = index,
                "root chunk out of order"
            );
            return Err(DistributorError::ChunkOutOfOrder {
                expected,
                found: index,
            });
        }
        let expected_len = self.expected_chunk_len(index);
        if bytes.len() != expected_len {
            return Err(DistributorError::ChunkSizeMismatch {
                index,
                expected: expected_len,
                found: bytes.len(),
            });
        }

        self.buffer.extend_from_slice(bytes);
        self.upload
            .increment(1)
            .map_err(|_| DistributorError::AlreadyCommitted)?;
        debug!(
            epoch = self.epoch,
            chunk = index,
            of = self.upload.total(),
            "root chunk accepted"
        );

        if self.upload.is_complete() {
            self.merkle_root.copy_from_slice(&self.buffer);
            self.buffer.clear();
            self.committed_at = Some(current_slot);
            info!(
                epoch = self.epoch,
                root = hex::encode(self.merkle_root),
                slot = current_slot,
                "distribution root committed"
            );
        }
        Ok(())
    }

    fn bitmap_bit(&self, index: u64) -> bool {
        self.claimed_bitmap[index as usize / 8] >> (index % 8) & 1 == 1
    }

    fn set_bitmap_bit(&mut self, index: u64) {
        self.claimed_bitmap[index as usize / 8] |= 1 << (index % 8);
    }

    /// Verify a claim against the committed root and mark its leaf claimed.
    ///
    /// Recomputes the leaf hash from the caller's `(recipient, amount)` and
    /// folds the proof path by its explicit side bits; any disagreement with
    /// the committed root is `ProofMismatch`. A leaf claims exactly once.
    pub fn verify_claim(
        &mut self,
        recipient: Address,
        amount: TokenAmount,
        proof: &ClaimProof,
    ) -> Result<ClaimReceipt> {
        let root = self.committed_root()?;
        if self.reclaimed {
            return Err(DistributorError::AlreadyReclaimed);
        }

        let leaf_index = proof.leaf_index().ok_or(DistributorError::ProofMismatch)?;
        if leaf_index >= self.max_num_nodes {
            return Err(DistributorError::LeafIndexOutOfRange {
                index: leaf_index,
                max: self.max_num_nodes,
            });
        }

        let leaf = RewardLeaf { recipient, amount };
        let folded = fold_proof(leaf_hash(&leaf, &self.salt), proof)?;
        if folded != root {
            return Err(DistributorError::ProofMismatch);
        }

        if self.bitmap_bit(leaf_index) {
            return Err(DistributorError::AlreadyClaimed);
        }
        self.claimed
            .increment(amount.units())
            .map_err(|e| match e {
                ProgressError::ExceedsTotal { tally, total, amount } => {
                    DistributorError::MaxClaimExceeded {
                        amount,
                        claimed: tally,
                        max: total,
                    }
                }
                _ => DistributorError::ArithmeticOverflow,
            })?;
        self.set_bitmap_bit(leaf_index);

        info!(
            epoch = self.epoch,
            recipient = %recipient,
            amount = %amount,
            leaf = leaf_index,
            "claim verified"
        );
        Ok(ClaimReceipt {
            recipient,
            amount,
            leaf_index,
        })
    }

    /// Sweep the unclaimed residual once the claim window has passed. The
    /// only way funds leave a committed distribution other than claims, and
    /// it fires exactly once.
    pub fn reclaim_unclaimed(
        &mut self,
        current_slot: Slot,
        claim_window_slots: u64,
    ) -> Result<TokenAmount> {
        let committed_at = self
            .committed_at
            .ok_or(DistributorError::RootNotCommitted)?;
        if self.reclaimed {
            return Err(DistributorError::AlreadyReclaimed);
        }
        let until = committed_at.saturating_add(claim_window_slots);
        if current_slot < until {
            return Err(DistributorError::ClaimWindowOpen { until });
        }

        self.reclaimed = true;
        let residual = self
            .max_total_claim()
            .saturating_sub(self.claimed_amount());
        info!(
            epoch = self.epoch,
            residual = %residual,
            slot = current_slot,
            "unclaimed balance reclaimed"
        );
        Ok(residual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{derive_salt, MerkleTree};

    fn tree_and_root(leaf_amounts: &[u64], chunk_size: usize) -> (MerkleTree, DistributionRoot) {
        let network = Address::new_unique();
        let salt = derive_salt(&network, 3);
        let leaves = leaf_amounts
            .iter()
            .map(|&amount| RewardLeaf {
                recipient: Address::new_unique(),
                amount: TokenAmount::new(amount),
            })
            .collect();
        let tree = MerkleTree::build(leaves, salt).unwrap();
        let root = DistributionRoot::new(
            network,
            3,
            salt,
            tree.total_amount().unwrap(),
            tree.leaf_count(),
            chunk_size,
        )
        .unwrap();
        (tree, root)
    }

    fn commit(tree: &MerkleTree, root: &mut DistributionRoot) {
        let chunks = root_chunks(&tree.root(), root.chunk_size()).unwrap();
        for (index, chunk) in chunks.iter().enumerate() {
            root.upload_chunk(index as u64, chunk, 500).unwrap();
        }
        assert!(root.is_committed());
    }

    #[test]
    fn test_chunk_geometry() {
        assert_eq!(chunk_count(8).unwrap(), 4);
        assert_eq!(chunk_count(32).unwrap(), 1);
        assert_eq!(chunk_count(5).unwrap(), 7);
        assert_eq!(chunk_count(0), Err(DistributorError::ZeroChunkSize));

        let chunks = root_chunks(&[7u8; 32], 5).unwrap();
        assert_eq!(chunks.len(), 7);
        assert_eq!(chunks[6].len(), 2);
    }

    #[test]
    fn test_out_of_order_and_duplicate_chunks_rejected() {
        let (tree, mut root) = tree_and_root(&[10, 20, 15], 8);
        let chunks = root_chunks(&tree.root(), 8).unwrap();

        assert_eq!(
            root.upload_chunk(1, &chunks[1], 500),
            Err(DistributorError::ChunkOutOfOrder {
                expected: 0,
                found: 1
            })
        );
        root.upload_chunk(0, &chunks[0], 500).unwrap();
        // Re-submitting chunk 0 never double-counts.
        assert_eq!(
            root.upload_chunk(0, &chunks[0], 500),
            Err(DistributorError::ChunkOutOfOrder {
                expected: 1,
                found: 0
            })
        );
        assert_eq!(root.upload_progress().tally(), 1);
    }

    #[test]
    fn test_wrong_length_chunk_rejected() {
        let (tree, mut root) = tree_and_root(&[10], 8);
        let chunks = root_chunks(&tree.root(), 8).unwrap();
        assert_eq!(
            root.upload_chunk(0, &chunks[0][..5], 500),
            Err(DistributorError::ChunkSizeMismatch {
                index: 0,
                expected: 8,
                found: 5
            })
        );
    }

    #[test]
    fn test_commit_then_further_uploads_fail() {
        let (tree, mut root) = tree_and_root(&[10, 20], 16);
        commit(&tree, &mut root);

        assert_eq!(root.committed_root().unwrap(), tree.root());
        assert_eq!(root.committed_at(), Some(500));
        assert_eq!(
            root.upload_chunk(2, &[0u8; 16], 501),
            Err(DistributorError::AlreadyCommitted)
        );
    }

    #[test]
    fn test_claim_round_trip_and_idempotence() {
        let (tree, mut root) = tree_and_root(&[10, 20, 15], 8);
        commit(&tree, &mut root);

        for (index, reward) in tree.leaves().iter().enumerate() {
            let proof = tree.proof(index).unwrap();
            let receipt = root
                .verify_claim(reward.recipient, reward.amount, &proof)
                .unwrap();
            assert_eq!(receipt.leaf_index, index as u64);

            assert_eq!(
                root.verify_claim(reward.recipient, reward.amount, &proof),
                Err(DistributorError::AlreadyClaimed)
            );
        }
        assert_eq!(root.claimed_amount(), TokenAmount::new(45));
    }

    #[test]
    fn test_claim_before_commit_fails() {
        let (tree, mut root) = tree_and_root(&[10], 8);
        let reward = tree.leaves()[0];
        let proof = tree.proof(0).unwrap();
        assert_eq!(
            root.verify_claim(reward.recipient, reward.amount, &proof),
            Err(DistributorError::RootNotCommitted)
        );
    }

    #[test]
    fn test_mutated_proof_or_amount_is_a_mismatch() {
        let (tree, mut root) = tree_and_root(&[10, 20, 15, 5], 8);
        commit(&tree, &mut root);
        let reward = tree.leaves()[1];
        let proof = tree.proof(1).unwrap();

        let mut bad_proof = proof.clone();
        bad_proof.siblings[0][31] ^= 0x80;
        assert_eq!(
            root.verify_claim(reward.recipient, reward.amount, &bad_proof),
            Err(DistributorError::ProofMismatch)
        );

        assert_eq!(
            root.verify_claim(reward.recipient, TokenAmount::new(21), &proof),
            Err(DistributorError::ProofMismatch)
        );

        // The genuine claim still goes through afterwards.
        assert!(root
            .verify_claim(reward.recipient, reward.amount, &proof)
            .is_ok());
    }

    #[test]
    fn test_reclaim_respects_window_and_fires_once() {
        let (tree, mut root) = tree_and_root(&[10, 20], 8);
        commit(&tree, &mut root); // committed at slot 500

        let reward = tree.leaves()[0];
        let proof = tree.proof(0).unwrap();
        root.verify_claim(reward.recipient, reward.amount, &proof)
            .unwrap();

        assert_eq!(
            root.reclaim_unclaimed(599, 100),
            Err(DistributorError::ClaimWindowOpen { until: 600 })
        );
        let residual = root.reclaim_unclaimed(600, 100).unwrap();
        assert_eq!(residual.units(), 30 - reward.amount.units());
        assert_eq!(
            root.reclaim_unclaimed(601, 100),
            Err(DistributorError::AlreadyReclaimed)
        );

        // Claims after the sweep are refused.
        let other = tree.leaves()[1];
        let other_proof = tree.proof(1).unwrap();
        assert_eq!(
            root.verify_claim(other.recipient, other.amount, &other_proof),
            Err(DistributorError::AlreadyReclaimed)
        );
    }

    #[test]
    fn test_record_round_trip() {
        let (tree, mut root) = tree_and_root(&[10, 20], 8);
        commit(&tree, &mut root);
        let bytes = root.encode().unwrap();
        assert_eq!(DistributionRoot::decode(&bytes).unwrap(), root);
    }
}
