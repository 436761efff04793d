//! Assigning fresh, deterministic singleton tags at a stage boundary
//! (§4.D): every backward strategy and the stage walker itself root a
//! stage's lineage in one of these.

use crate::engine::Engine;
use crate::error::Result;
use crate::tag::{encode_id, Tag};
use crate::tagged::{Tagged, TaggedPartitions};
use crate::dataset::DatasetId;
use crate::value::Value;

/// Tags every element of `id` with the singleton `{encode(partition, position)}`,
/// deterministic across repeated calls for the same materialized dataset —
/// the property the backward strategies rely on when they re-derive a
/// stage's tag space more than once.
pub fn unique_tag(engine: &Engine, id: DatasetId) -> Result<TaggedPartitions> {
    let partitions = engine.evaluate(id)?;
    partitions
        .into_iter()
        .enumerate()
        .map(|(p, part)| {
            part.into_iter()
                .enumerate()
                .map(|(i, elem)| Ok(Tagged::new(elem, Tag::singleton(encode_id(p, i)?))))
                .collect::<Result<Vec<_>>>()
        })
        .collect()
}

/// Tags every element of `id` with `Tag::empty()` — used when a dataset is
/// unreachable from the trace's source, so its elements carry no lineage.
pub fn all_empty(engine: &Engine, id: DatasetId) -> Result<TaggedPartitions> {
    let partitions = engine.evaluate(id)?;
    Ok(partitions
        .into_iter()
        .map(|part| part.into_iter().map(|elem| Tagged::new(elem, Tag::empty())).collect())
        .collect())
}

/// Tags every element of `id` with its own unique singleton if it matches
/// `predicate`, `Tag::empty()` otherwise — the seed a forward trace starts
/// from (§4.F).
pub fn tag_by_predicate(engine: &Engine, id: DatasetId, predicate: &dyn Fn(&Value) -> bool) -> Result<TaggedPartitions> {
    let partitions = engine.evaluate(id)?;
    partitions
        .into_iter()
        .enumerate()
        .map(|(p, part)| {
            part.into_iter()
                .enumerate()
                .map(|(i, elem)| {
                    let tag = if predicate(&elem) { Tag::singleton(encode_id(p, i)?) } else { Tag::empty() };
                    Ok(Tagged::new(elem, tag))
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_source() -> (Engine, DatasetId) {
        let mut engine = Engine::new();
        let id = engine.new_source(vec![vec![Value::Int(10), Value::Int(20)], vec![Value::Int(30)]]);
        (engine, id)
    }

    #[test]
    fn unique_tag_is_deterministic() {
        let (engine, id) = engine_with_source();
        let first = unique_tag(&engine, id).unwrap();
        let second = unique_tag(&engine, id).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unique_tag_assigns_distinct_singletons() {
        let (engine, id) = engine_with_source();
        let tagged = unique_tag(&engine, id).unwrap();
        let mut seen = std::collections::HashSet::new();
        for part in &tagged {
            for t in part {
                let elem_id = t.tag.as_singleton().expect("unique_tag always yields singletons");
                assert!(seen.insert(elem_id), "duplicate id assigned");
            }
        }
    }

    #[test]
    fn all_empty_carries_no_lineage() {
        let (engine, id) = engine_with_source();
        let tagged = all_empty(&engine, id).unwrap();
        assert!(tagged.into_iter().flatten().all(|t| t.tag.is_empty()));
    }

    #[test]
    fn predicate_tagging_only_marks_matches() {
        let (engine, id) = engine_with_source();
        let tagged = tag_by_predicate(&engine, id, &|v| matches!(v, Value::Int(n) if *n >= 20)).unwrap();
        let flat: Vec<_> = tagged.into_iter().flatten().collect();
        for t in &flat {
            let matches = matches!(&t.elem, Value::Int(n) if *n >= 20);
            assert_eq!(t.tag.is_non_empty(), matches);
        }
    }
}
