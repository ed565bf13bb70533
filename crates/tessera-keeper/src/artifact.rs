use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tessera_distributor::MerkleTree;
use tessera_types::{Address, Epoch, Slot};
use tracing::info;

/// Everything a recipient needs to claim, plus enough context to audit the
/// distribution: the tree dump the keeper writes after each committed epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionArtifact {
    pub network: String,
    pub epoch: Epoch,
    pub boundary_slot: Slot,
    pub root: String,
    pub salt: String,
    pub generated_at: DateTime<Utc>,
    pub leaves: Vec<ArtifactLeaf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactLeaf {
    pub recipient: String,
    pub amount: u64,
    pub leaf_index: u64,
    pub proof_siblings: Vec<String>,
    pub proof_sides: u64,
}

impl DistributionArtifact {
    pub fn from_tree(
        network: &Address,
        epoch: Epoch,
        boundary_slot: Slot,
        tree: &MerkleTree,
    ) -> Self {
        let leaves = tree
            .leaves()
            .iter()
            .enumerate()
            .filter_map(|(index, leaf)| {
                let proof = tree.proof(index)?;
                Some(ArtifactLeaf {
                    recipient: leaf.recipient.to_hex(),
                    amount: leaf.amount.units(),
                    leaf_index: index as u64,
                    proof_siblings: proof.siblings.iter().map(hex::encode).collect(),
                    proof_sides: proof.sides,
                })
            })
            .collect();

        Self {
            network: network.to_hex(),
            epoch,
            boundary_slot,
            root: hex::encode(tree.root()),
            salt: hex::encode(tree.salt()),
            generated_at: Utc::now(),
            leaves,
        }
    }

    pub fn file_name(&self) -> String {
        format!("distribution-epoch-{}.json", self.epoch)
    }

    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), leaves = self.leaves.len(), "artifact written");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
