//! End-to-end distribution properties: large-tree round trips, proof
//! tampering, and the chunked commitment protocol under awkward chunk sizes.

use tessera_distributor::{
    derive_salt, fold_proof, leaf_hash, root_chunks, DistributionRoot, DistributorError,
    MerkleTree, RewardLeaf,
};
use tessera_types::{Address, TokenAmount};

fn leaves(n: u64) -> Vec<RewardLeaf> {
    (0..n)
        .map(|i| RewardLeaf {
            recipient: Address::new_unique(),
            amount: TokenAmount::new(i + 1),
        })
        .collect()
}

#[test]
fn every_leaf_of_a_large_tree_verifies() {
    let network = Address::new_unique();
    let salt = derive_salt(&network, 9);
    let tree = MerkleTree::build(leaves(10_000), salt).unwrap();
    let root = tree.root();

    for (index, reward) in tree.leaves().iter().enumerate() {
        let proof = tree.proof(index).unwrap();
        assert_eq!(
            fold_proof(leaf_hash(reward, &salt), &proof).unwrap(),
            root,
            "leaf {index} failed to verify"
        );
    }
}

#[test]
fn any_single_byte_flip_breaks_a_proof() {
    let network = Address::new_unique();
    let salt = derive_salt(&network, 9);
    let tree = MerkleTree::build(leaves(33), salt).unwrap();

    let mut dist = DistributionRoot::new(
        network,
        9,
        salt,
        tree.total_amount().unwrap(),
        tree.leaf_count(),
        8,
    )
    .unwrap();
    for (i, chunk) in root_chunks(&tree.root(), 8).unwrap().iter().enumerate() {
        dist.upload_chunk(i as u64, chunk, 100).unwrap();
    }

    let reward = tree.leaves()[17];
    let proof = tree.proof(17).unwrap();
    for element in 0..proof.siblings.len() {
        for byte in 0..32 {
            let mut tampered = proof.clone();
            tampered.siblings[element][byte] ^= 0xA5;
            assert_eq!(
                dist.verify_claim(reward.recipient, reward.amount, &tampered),
                Err(DistributorError::ProofMismatch),
                "flip at element {element} byte {byte} was accepted"
            );
        }
    }
    // And the untouched proof still succeeds exactly once.
    assert!(dist
        .verify_claim(reward.recipient, reward.amount, &proof)
        .is_ok());
    assert_eq!(
        dist.verify_claim(reward.recipient, reward.amount, &proof),
        Err(DistributorError::AlreadyClaimed)
    );
}

#[test]
fn three_leaf_root_is_deterministic_under_input_permutation() {
    // [(A,10),(B,20),(C,15)] in any input order commits the same root,
    // because construction sorts leaves by leaf hash before hashing levels.
    let network = Address::new_unique();
    let salt = derive_salt(&network, 1);
    let a = RewardLeaf {
        recipient: Address::new_unique(),
        amount: TokenAmount::new(10),
    };
    let b = RewardLeaf {
        recipient: Address::new_unique(),
        amount: TokenAmount::new(20),
    };
    let c = RewardLeaf {
        recipient: Address::new_unique(),
        amount: TokenAmount::new(15),
    };

    let reference = MerkleTree::build(vec![a, b, c], salt).unwrap();
    let permutations = [
        vec![a, c, b],
        vec![b, a, c],
        vec![b, c, a],
        vec![c, a, b],
        vec![c, b, a],
    ];
    for permutation in permutations {
        let tree = MerkleTree::build(permutation, salt).unwrap();
        assert_eq!(tree.root(), reference.root());
        assert_eq!(tree.leaves(), reference.leaves());
    }
}

#[test]
fn chunk_sizes_that_do_not_divide_the_root_still_commit() {
    let network = Address::new_unique();
    let salt = derive_salt(&network, 2);
    let tree = MerkleTree::build(leaves(5), salt).unwrap();

    for chunk_size in [1usize, 3, 5, 7, 8, 16, 31, 32, 64] {
        let mut dist = DistributionRoot::new(
            network,
            2,
            salt,
            tree.total_amount().unwrap(),
            tree.leaf_count(),
            chunk_size,
        )
        .unwrap();
        let chunks = root_chunks(&tree.root(), chunk_size).unwrap();
        assert_eq!(chunks.len() as u64, dist.upload_progress().total());
        for (i, chunk) in chunks.iter().enumerate() {
            dist.upload_chunk(i as u64, chunk, 50).unwrap();
        }
        assert_eq!(dist.committed_root().unwrap(), tree.root());
    }
}

#[test]
fn upload_tally_is_monotonic_under_adversarial_indices() {
    let network = Address::new_unique();
    let salt = derive_salt(&network, 4);
    let tree = MerkleTree::build(leaves(3), salt).unwrap();
    let mut dist = DistributionRoot::new(
        network,
        4,
        salt,
        tree.total_amount().unwrap(),
        tree.leaf_count(),
        8,
    )
    .unwrap();
    let chunks = root_chunks(&tree.root(), 8).unwrap();

    let mut last_tally = 0;
    for attempt in [3u64, 0, 0, 2, 1, 1, 9, 2, 2, 3, 3] {
        let expected = dist.upload_progress().tally();
        let result = dist.upload_chunk(attempt, &chunks[attempt as usize % 4], 50);
        assert_eq!(result.is_ok(), attempt == expected);

        let tally = dist.upload_progress().tally();
        assert!(tally >= last_tally);
        assert!(tally <= dist.upload_progress().total());
        last_tally = tally;
    }
    assert!(dist.is_committed());
}
