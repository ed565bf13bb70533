use crate::error::{DistributorError, Result};
use serde::{Deserialize, Serialize};
use tessera_types::{Address, Epoch, TokenAmount};
use tracing::debug;

/// Domain separation prefixes. A leaf hash can never collide with an
/// internal node hash, which closes the classic second-preimage
/// leaf/node confusion on naive Merkle trees.
const LEAF_DOMAIN: u8 = 0x00;
const NODE_DOMAIN: u8 = 0x01;

/// Hard cap on leaves per distribution; keeps proof depth within the
/// 64-bit sides field with a wide margin.
pub const MAX_LEAVES: usize = 1 << 20;

/// One recipient's reward inside a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardLeaf {
    pub recipient: Address,
    pub amount: TokenAmount,
}

/// Membership proof for one leaf: sibling hashes bottom-up plus a sides
/// bitfield. Bit `k` set means the level-`k` sibling hashes on the LEFT of
/// the running node. Because a node is a right child exactly when its index
/// bit at that level is 1, the sides bits double as the canonical leaf
/// index, which is what addresses the claimed bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimProof {
    pub siblings: Vec<[u8; 32]>,
    pub sides: u64,
}

impl ClaimProof {
    /// Canonical index of the proven leaf, recovered from the sides bits.
    /// `None` when bits beyond the proof depth are set, which can only be a
    /// malformed or tampered proof.
    pub fn leaf_index(&self) -> Option<u64> {
        if self.siblings.len() > 64 {
            return None;
        }
        if self.siblings.len() < 64 && self.sides >> self.siblings.len() != 0 {
            return None;
        }
        Some(self.sides)
    }
}

/// Salt for one (network, epoch) distribution, derived rather than stored so
/// a restarted keeper reconstructs the identical tree.
pub fn derive_salt(network: &Address, epoch: Epoch) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"tessera:distribution_salt");
    hasher.update(network.as_bytes());
    hasher.update(&epoch.to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// `H(0x00 || recipient || amount_le || salt)`.
pub fn leaf_hash(leaf: &RewardLeaf, salt: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_DOMAIN]);
    hasher.update(leaf.recipient.as_bytes());
    hasher.update(&leaf.amount.units().to_le_bytes());
    hasher.update(salt);
    *hasher.finalize().as_bytes()
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_DOMAIN]);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Fold a proof path from a recomputed leaf hash up to a root candidate.
/// Sibling order comes from the explicit sides bits, never from inference.
pub fn fold_proof(leaf: [u8; 32], proof: &ClaimProof) -> Result<[u8; 32]> {
    if proof.siblings.len() > 64 {
        return Err(DistributorError::ProofTooDeep(proof.siblings.len()));
    }
    let mut node = leaf;
    for (level, sibling) in proof.siblings.iter().enumerate() {
        node = if proof.sides >> level & 1 == 1 {
            node_hash(sibling, &node)
        } else {
            node_hash(&node, sibling)
        };
    }
    Ok(node)
}

/// Merkle tree over a distribution's reward leaves.
///
/// Leaves are sorted by leaf hash before construction, so any permutation of
/// the input produces the identical root. The odd node at a level is paired
/// with itself (duplicated), never promoted unchanged; promotion is the
/// construction that admits forged proofs for truncated trees.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    salt: [u8; 32],
    leaves: Vec<RewardLeaf>,
    // levels[0] are the sorted leaf hashes; the last level is the root alone.
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    pub fn build(mut leaves: Vec<RewardLeaf>, salt: [u8; 32]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(DistributorError::EmptyLeaves);
        }
        if leaves.len() > MAX_LEAVES {
            return Err(DistributorError::TooManyLeaves {
                count: leaves.len(),
                max: MAX_LEAVES,
            });
        }

        leaves.sort_by_key(|leaf| leaf_hash(leaf, &salt));
        let base: Vec<[u8; 32]> = leaves.iter().map(|leaf| leaf_hash(leaf, &salt)).collect();
        for pair in base.windows(2) {
            if pair[0] == pair[1] {
                let dup = leaves[base.iter().position(|h| *h == pair[0]).unwrap_or(0)];
                return Err(DistributorError::DuplicateLeaf(dup.recipient));
            }
        }

        let mut levels = vec![base];
        loop {
            let below = &levels[levels.len() - 1];
            if below.len() == 1 {
                break;
            }
            let mut above = Vec::with_capacity((below.len() + 1) / 2);
            for pair in below.chunks(2) {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                above.push(node_hash(left, right));
            }
            levels.push(above);
        }

        debug!(
            leaves = leaves.len(),
            depth = levels.len() - 1,
            "merkle tree built"
        );
        Ok(Self {
            salt,
            leaves,
            levels,
        })
    }

    pub fn root(&self) -> [u8; 32] {
        self.levels[self.levels.len() - 1][0]
    }

    pub fn salt(&self) -> [u8; 32] {
        self.salt
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// Leaves in canonical (leaf-hash) order; position is the leaf index
    /// the claimed bitmap is addressed by.
    pub fn leaves(&self) -> &[RewardLeaf] {
        &self.leaves
    }

    /// Checked sum of every leaf amount; the distribution's claim ceiling.
    pub fn total_amount(&self) -> Result<TokenAmount> {
        self.leaves
            .iter()
            .try_fold(TokenAmount::ZERO, |acc, leaf| acc.checked_add(leaf.amount))
            .ok_or(DistributorError::ArithmeticOverflow)
    }

    /// Proof for the leaf at `index` in canonical order.
    pub fn proof(&self, index: usize) -> Option<ClaimProof> {
        if index >= self.leaves.len() {
            return None;
        }
        let mut siblings = Vec::with_capacity(self.levels.len() - 1);
        let mut sides: u64 = 0;
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_position = position ^ 1;
            // The odd last node pairs with itself.
            let sibling = level.get(sibling_position).unwrap_or(&level[position]);
            if position & 1 == 1 {
                sides |= 1 << siblings.len();
            }
            siblings.push(*sibling);
            position >>= 1;
        }
        Some(ClaimProof { siblings, sides })
    }

    /// Proof for a recipient, with its canonical leaf index.
    pub fn proof_for(&self, recipient: &Address) -> Option<(usize, ClaimProof)> {
        let index = self
            .leaves
            .iter()
            .position(|leaf| leaf.recipient == *recipient)?;
        Some((index, self.proof(index)?))
    }
}
