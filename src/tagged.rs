//! The tag-preserving dataset wrapper: a `Value` paired with the `Tag`
//! describing which source elements contributed to it.

use crate::tag::Tag;
use crate::value::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tagged<T> {
    pub elem: T,
    pub tag: Tag,
}

impl<T> Tagged<T> {
    pub fn new(elem: T, tag: Tag) -> Self {
        Tagged { elem, tag }
    }
}

/// A dataset's materialized, tagged elements, one `Vec` per partition.
/// Partition order and in-partition order are significant: `unique_tag`
/// derives element identities from exactly this shape.
pub type TaggedPartitions = Vec<Vec<Tagged<Value>>>;
