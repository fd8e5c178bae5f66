use sha2::Digest;
use std::marker::PhantomData;

use super::{hash_two, mix_in_length, zero_hashes, Hash, MerkleError};

#[derive(Clone, Debug)]
/// Append-only merkle accumulator, the same one the deposit contract keeps on-chain.
///
/// Only the left-hand "branch" of the next free leaf is stored, so pushing a leaf and
/// computing the root both take `num_levels` hashes.
pub struct DepositTree<H>
where
	H: Digest,
{
	/// Left siblings on the path of the next free leaf
	branch: Vec<Hash>,
	/// Default nodes
	default: Vec<Hash>,
	/// Number of leaves pushed so far
	count: u64,
	/// PhantomData for the hasher
	_h: PhantomData<H>,
}

impl<H> DepositTree<H>
where
	H: Digest,
{
	pub fn new(num_levels: usize) -> Self {
		let default = zero_hashes::<H>(num_levels);
		Self { branch: vec![Hash::default(); num_levels], default, count: 0, _h: PhantomData }
	}

	pub fn len(&self) -> u64 {
		self.count
	}

	pub fn is_empty(&self) -> bool {
		self.count == 0
	}

	fn num_levels(&self) -> usize {
		self.branch.len()
	}

	/// Number of leaves that can still be pushed.
	pub fn remaining(&self) -> u128 {
		let max_size = (1u128 << self.num_levels()) - 1;
		max_size - self.count as u128
	}

	pub fn push(&mut self, leaf: Hash) -> Result<(), MerkleError> {
		if self.remaining() == 0 {
			return Err(MerkleError::TreeFull);
		}

		self.count += 1;
		let mut size = self.count;
		let mut node = leaf;
		for height in 0..self.num_levels() {
			if size & 1 == 1 {
				self.branch[height] = node;
				return Ok(());
			}
			node = hash_two::<H>(self.branch[height], node);
			size /= 2;
		}
		// A count below 2^num_levels always has a set bit within `num_levels`.
		unreachable!("deposit tree branch overflow")
	}

	pub fn push_batch(&mut self, leaves: impl IntoIterator<Item = Hash>) -> Result<(), MerkleError> {
		for leaf in leaves {
			self.push(leaf)?;
		}
		Ok(())
	}

	/// Tree root with the leaf count mixed in.
	pub fn root(&self) -> Hash {
		let mut node = Hash::default();
		let mut size = self.count;
		for height in 0..self.num_levels() {
			node = if size & 1 == 1 {
				hash_two::<H>(self.branch[height], node)
			} else {
				hash_two::<H>(node, self.default[height])
			};
			size /= 2;
		}
		mix_in_length::<H>(node, self.count)
	}
}
