//! The tag algebra: finite sets of source-element identities that ride
//! alongside every value as it moves through a lifted transformation.
//!
//! `Tag` only needs to support the handful of set operations used by the
//! rest of the crate (union, intersection, emptiness, membership, fold).
//! The representation is a sorted set, which keeps `union`/`intersect` at
//! `O(n + m)` and gives a canonical iteration order for free — useful for
//! both the event log and for deterministic tests.

use std::collections::BTreeSet;
use std::collections::btree_set;

use crate::error::{LineageError, Result};

/// A finite set of non-negative element identities.
///
/// Union is commutative, associative and idempotent, with `Tag::empty()` as
/// identity — the properties every lifted transformation relies on when it
/// merges tags from more than one input element.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Tag(BTreeSet<u64>);

impl Tag {
    /// The additive identity: no element contributed to this one.
    pub fn empty() -> Tag {
        Tag(BTreeSet::new())
    }

    /// A tag naming exactly one element identity.
    pub fn singleton(id: u64) -> Tag {
        let mut set = BTreeSet::new();
        set.insert(id);
        Tag(set)
    }

    pub fn union(&self, other: &Tag) -> Tag {
        Tag(self.0.union(&other.0).copied().collect())
    }

    pub fn union_with(&mut self, other: &Tag) {
        for &id in &other.0 {
            self.0.insert(id);
        }
    }

    pub fn intersect(&self, other: &Tag) -> Tag {
        Tag(self.0.intersection(&other.0).copied().collect())
    }

    pub fn is_non_empty(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The single element identity this tag carries, if it carries exactly
    /// one. Every tag produced by `unique_tag` satisfies this; a tag that
    /// has absorbed more than one element's worth of lineage does not.
    pub fn as_singleton(&self) -> Option<u64> {
        let mut iter = self.0.iter();
        match (iter.next(), iter.next()) {
            (Some(&id), None) => Some(id),
            _ => None,
        }
    }

    pub fn iter(&self) -> btree_set::Iter<'_, u64> {
        self.0.iter()
    }

    /// Unions an arbitrary number of tags, `empty()` for zero of them.
    pub fn fold<'a, I: IntoIterator<Item = &'a Tag>>(tags: I) -> Tag {
        tags.into_iter().fold(Tag::empty(), |acc, t| acc.union(t))
    }
}

/// Packs a partition index and an in-partition position into the 64-bit
/// element identity `unique_tag` assigns: `(partition << 32) | position`.
/// Both halves must fit in 32 bits — a partition or a position that doesn't
/// means the dataset is larger than this identity scheme supports.
pub fn encode_id(partition: usize, position: usize) -> Result<u64> {
    let p = u32::try_from(partition).map_err(|_| LineageError::TagSpaceExhausted { partition, position })?;
    let i = u32::try_from(position).map_err(|_| LineageError::TagSpaceExhausted { partition, position })?;
    Ok(((p as u64) << 32) | i as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ids: &[u64]) -> Tag {
        ids.iter().fold(Tag::empty(), |acc, &id| acc.union(&Tag::singleton(id)))
    }

    #[test]
    fn union_is_commutative() {
        let a = t(&[1, 2]);
        let b = t(&[2, 3]);
        assert_eq!(a.union(&b), b.union(&a));
    }

    #[test]
    fn union_is_associative() {
        let a = t(&[1]);
        let b = t(&[2]);
        let c = t(&[3]);
        assert_eq!(a.union(&b).union(&c), a.union(&b.union(&c)));
    }

    #[test]
    fn union_is_idempotent() {
        let a = t(&[1, 2, 3]);
        assert_eq!(a.union(&a), a);
    }

    #[test]
    fn empty_is_identity() {
        let a = t(&[1, 2]);
        assert_eq!(a.union(&Tag::empty()), a);
    }

    #[test]
    fn intersect_distributes_over_union() {
        let a = t(&[1, 2]);
        let b = t(&[2, 3]);
        let c = t(&[3, 4]);
        let lhs = a.intersect(&b.union(&c));
        let rhs = a.intersect(&b).union(&a.intersect(&c));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn fold_of_no_tags_is_empty() {
        let empty: Vec<&Tag> = Vec::new();
        assert_eq!(Tag::fold(empty), Tag::empty());
    }

    #[test]
    fn encode_id_packs_partition_and_position() {
        assert_eq!(encode_id(1, 2).unwrap(), (1u64 << 32) | 2);
        assert_eq!(encode_id(0, 0).unwrap(), 0);
    }

    #[test]
    fn encode_id_rejects_oversized_partition() {
        let err = encode_id(usize::MAX, 0).unwrap_err();
        assert!(matches!(err, LineageError::TagSpaceExhausted { .. }));
    }

    #[test]
    fn as_singleton_only_matches_single_element_tags() {
        assert_eq!(Tag::singleton(7).as_singleton(), Some(7));
        assert_eq!(Tag::empty().as_singleton(), None);
        assert_eq!(t(&[1, 2]).as_singleton(), None);
    }
}
