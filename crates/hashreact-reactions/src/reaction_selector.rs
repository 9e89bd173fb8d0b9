//! Hash-based reaction selection.
//!
//! The index is `sha256(decimal(message_id)) mod pool_len`, with the digest read
//! as a big-endian unsigned integer. Changing the hashed input or the byte order
//! would remap every historical message, so both are fixed here.

use std::num::NonZeroUsize;

use hashreact_core::Snowflake;
use sha2::{Digest, Sha256};

use crate::reaction_pool::{ReactionPool, ReactionSet};

/// Returns the pool index assigned to `message_id` for a pool of `len` sets.
pub fn reaction_index(message_id: Snowflake, len: NonZeroUsize) -> usize {
    let digest = Sha256::digest(message_id.to_string().as_bytes());
    digest_mod(&digest, len)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionSelection<'a> {
    pub index: usize,
    pub set: &'a ReactionSet,
}

/// Selects the reaction set for `message_id`, keeping the index for logs.
pub fn select_reaction(message_id: Snowflake, pool: &ReactionPool) -> ReactionSelection<'_> {
    let index = reaction_index(message_id, pool.len());
    ReactionSelection {
        index,
        set: &pool.sets()[index],
    }
}

/// Selects the reaction set for `message_id`.
pub fn select_reaction_set(message_id: Snowflake, pool: &ReactionPool) -> &ReactionSet {
    select_reaction(message_id, pool).set
}

// Horner reduction over the digest bytes. The accumulator stays below the
// modulus, so `acc * 256 + 255` fits comfortably in u128 for any usize modulus.
fn digest_mod(digest: &[u8], len: NonZeroUsize) -> usize {
    let modulus = len.get() as u128;
    let remainder = digest.iter().fold(0u128, |acc, byte| {
        (acc * 256 + u128::from(*byte)) % modulus
    });
    remainder as usize
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use hashreact_core::Snowflake;
    use proptest::prelude::*;

    use super::{digest_mod, reaction_index, select_reaction, select_reaction_set};
    use crate::reaction_pool::{ReactionPool, ReactionSet};

    fn len(value: usize) -> NonZeroUsize {
        NonZeroUsize::new(value).expect("non-zero")
    }

    fn sample_pool(size: usize) -> ReactionPool {
        ReactionPool::new(
            (0..size)
                .map(|index| ReactionSet::from_iter([format!("set-{index}")]))
                .collect(),
        )
        .expect("pool")
    }

    #[test]
    fn unit_known_vectors_match_reference_indices() {
        let id = Snowflake::new(175928847299117063);
        assert_eq!(reaction_index(id, len(3)), 0);
        assert_eq!(reaction_index(id, len(5)), 4);
        assert_eq!(reaction_index(id, len(7)), 5);
        assert_eq!(reaction_index(Snowflake::new(1), len(7)), 1);
        assert_eq!(reaction_index(Snowflake::new(42), len(5)), 3);
        assert_eq!(reaction_index(Snowflake::new(42), len(7)), 4);
    }

    #[test]
    fn regression_index_is_not_raw_id_modulus() {
        let id = Snowflake::new(175928847299117063);
        let raw_index = (id.get() % 5) as usize;
        assert_eq!(raw_index, 3);
        assert_ne!(reaction_index(id, len(5)), raw_index);
    }

    #[test]
    fn unit_single_set_pool_always_selects_it() {
        let pool = sample_pool(1);
        for raw in [0_u64, 1, 99, u64::MAX] {
            assert_eq!(
                select_reaction_set(Snowflake::new(raw), &pool).symbols(),
                ["set-0"]
            );
        }
    }

    #[test]
    fn unit_selection_reports_index_of_returned_set() {
        let pool = sample_pool(7);
        let selection = select_reaction(Snowflake::new(175928847299117063), &pool);
        assert_eq!(selection.index, 5);
        assert_eq!(selection.set.symbols(), ["set-5"]);
    }

    #[test]
    fn unit_digest_mod_reads_big_endian() {
        assert_eq!(digest_mod(&[0x01, 0x00], len(1000)), 256);
        assert_eq!(digest_mod(&[0xff; 32], len(256)), 255);
        assert_eq!(digest_mod(&[0xff; 32], len(255)), 0);
    }

    proptest! {
        #[test]
        fn functional_selection_is_deterministic(raw_id in any::<u64>(), size in 1usize..64) {
            let pool = sample_pool(size);
            let first = select_reaction_set(Snowflake::new(raw_id), &pool);
            let second = select_reaction_set(Snowflake::new(raw_id), &pool);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn functional_selection_stays_in_range(raw_id in any::<u64>(), size in 1usize..512) {
            let index = reaction_index(Snowflake::new(raw_id), len(size));
            prop_assert!(index < size);
            let pool = sample_pool(size);
            let selected = select_reaction_set(Snowflake::new(raw_id), &pool);
            prop_assert!(pool.sets().contains(selected));
        }
    }
}
