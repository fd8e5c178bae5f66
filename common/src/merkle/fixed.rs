use super::{hash_two, pack_bytes, zero_hashes, Hash};
use sha2::Digest;
use std::{collections::HashMap, marker::PhantomData};

#[derive(Clone, Debug)]
/// MerkleTree structure
pub struct DenseMerkleTree<H>
where
	H: Digest,
{
	/// HashMap to keep the nodes of each level
	pub(crate) nodes: HashMap<u8, Vec<Hash>>,
	/// Roots of empty subtrees
	default: Vec<Hash>,
	// Number of levels
	num_levels: u8,
	/// PhantomData for the hasher
	_h: PhantomData<H>,
}

impl<H> DenseMerkleTree<H>
where
	H: Digest,
{
	pub fn root(&self) -> Hash {
		self.nodes
			.get(&self.num_levels)
			.and_then(|level| level.first().copied())
			.unwrap_or(self.default[self.num_levels as usize])
	}

	/// Build a MerkleTree of the given height over the leaf nodes.
	/// Missing leaves are treated as zero chunks.
	pub fn new(leaves: Vec<Hash>, num_levels: u8) -> Self {
		assert!(
			(num_levels as u32) >= usize::BITS || leaves.len() <= 1usize << num_levels,
			"too many leaves for a tree of height {num_levels}"
		);
		let default = zero_hashes::<H>(num_levels as usize);

		let mut tree = HashMap::new();
		tree.insert(0u8, leaves);

		for i in 0..num_levels {
			let nodes = &tree[&i];
			let next: Vec<Hash> = nodes
				.chunks(2)
				.map(|chunk| {
					if chunk.len() == 2 {
						hash_two::<H>(chunk[0], chunk[1])
					} else {
						hash_two::<H>(chunk[0], default[i as usize])
					}
				})
				.collect();
			tree.insert(i + 1, next);
		}

		Self { nodes: tree, default, num_levels, _h: PhantomData }
	}

	/// Build the smallest tree that fits all the leaves.
	pub fn from_leaves(leaves: Vec<Hash>) -> Self {
		let num_levels = leaves.len().next_power_of_two().trailing_zeros() as u8;
		Self::new(leaves, num_levels)
	}
}

/// Root of an SSZ container given its field roots.
pub fn container_root<H: Digest>(fields: Vec<Hash>) -> Hash {
	DenseMerkleTree::<H>::from_leaves(fields).root()
}

/// Root of a fixed-size SSZ byte vector.
pub fn bytes_root<H: Digest>(bytes: &[u8]) -> Hash {
	DenseMerkleTree::<H>::from_leaves(pack_bytes(bytes)).root()
}
