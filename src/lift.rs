//! The transformation lifter (§4.C): turns a plain `Transform` into one
//! that carries tags alongside values, without ever inspecting the opaque
//! user closures it wraps — it only reads and reassembles the `Tag` field.
//!
//! `propagate` is the whole-path version used when stage boundaries don't
//! matter: it tunnels through every dependency, shuffle or narrow alike,
//! until it reaches `source`. The stage walker (`crate::stage`) has its
//! own, boundary-aware recursion that stops at a shuffle instead of
//! lifting through it, since a shuffle is exactly where one stage ends and
//! the next begins; both call into `apply_transform` below for the actual
//! per-variant table.

use fnv::FnvHashMap;

use crate::dataset::{DatasetId, Transform};
use crate::engine::Engine;
use crate::error::{LineageError, Result};
use crate::tag::Tag;
use crate::tagged::{Tagged, TaggedPartitions};
use crate::unique_tag::{all_empty, unique_tag};
use crate::value::Value;

/// Tags `r` all the way back to `source` in a single pass, ignoring stage
/// boundaries (§4.F forward trace and backward-single-step). `seed` is
/// used only when the recursion reaches `source` itself; `None` falls
/// back to a fresh `unique_tag(source)`.
pub fn propagate(engine: &Engine, r: DatasetId, source: DatasetId, seed: Option<&TaggedPartitions>) -> Result<TaggedPartitions> {
    if !engine.reachable(source, r)? {
        return all_empty(engine, r);
    }
    if r == source {
        return match seed {
            Some(seed) => Ok(seed.clone()),
            None => unique_tag(engine, r),
        };
    }
    let deps = engine.dependencies(r)?.to_vec();
    let mut parent_tagged: FnvHashMap<DatasetId, TaggedPartitions> = FnvHashMap::default();
    for dep in &deps {
        let tagged_parent = propagate(engine, dep.parent, source, seed)?;
        parent_tagged.insert(dep.parent, tagged_parent);
    }
    apply_transform(engine, r, &parent_tagged)
}

/// The per-variant lift table (§4.C). `parent_tagged` holds the already
/// lifted partitions for every dependency of `r`.
pub(crate) fn apply_transform(
    engine: &Engine,
    r: DatasetId,
    parent_tagged: &FnvHashMap<DatasetId, TaggedPartitions>,
) -> Result<TaggedPartitions> {
    let transform = engine.transform(r)?;
    match transform {
        Transform::Source => unique_tag(engine, r),
        Transform::Map { parent, f } => {
            let input = parent_tagged.get(parent).ok_or_else(|| missing_parent(r))?;
            Ok(input
                .iter()
                .map(|part| part.iter().map(|t| Tagged::new(f(&t.elem), t.tag.clone())).collect())
                .collect())
        }
        Transform::Filter { parent, p } => {
            let input = parent_tagged.get(parent).ok_or_else(|| missing_parent(r))?;
            Ok(input
                .iter()
                .map(|part| part.iter().filter(|t| p(&t.elem)).cloned().collect())
                .collect())
        }
        Transform::FlatMap { parent, f } => {
            let input = parent_tagged.get(parent).ok_or_else(|| missing_parent(r))?;
            Ok(input
                .iter()
                .map(|part| {
                    part.iter()
                        .flat_map(|t| f(&t.elem).into_iter().map(|u| Tagged::new(u, t.tag.clone())))
                        .collect()
                })
                .collect())
        }
        Transform::Union { parents } => {
            let mut out = Vec::new();
            for parent in parents {
                let input = parent_tagged.get(parent).ok_or_else(|| missing_parent(r))?;
                out.extend(input.iter().cloned());
            }
            Ok(out)
        }
        Transform::Cartesian { left, right } => {
            let left_tagged: Vec<Tagged<Value>> =
                parent_tagged.get(left).ok_or_else(|| missing_parent(r))?.iter().flatten().cloned().collect();
            let right_tagged: Vec<Tagged<Value>> =
                parent_tagged.get(right).ok_or_else(|| missing_parent(r))?.iter().flatten().cloned().collect();
            let mut out = Vec::with_capacity(left_tagged.len() * right_tagged.len());
            for a in &left_tagged {
                for b in &right_tagged {
                    out.push(Tagged::new(Value::pair(a.elem.clone(), b.elem.clone()), a.tag.union(&b.tag)));
                }
            }
            Ok(vec![out])
        }
        Transform::GroupByKey { parent } => {
            let input = parent_tagged.get(parent).ok_or_else(|| missing_parent(r))?;
            let flat: Vec<&Tagged<Value>> = input.iter().flatten().collect();
            let mut groups: Vec<(Value, Vec<Value>, Tag)> = Vec::new();
            for t in flat {
                let (k, v) = t
                    .elem
                    .as_pair()
                    .ok_or_else(|| LineageError::EngineFailure("group_by_key input is not a pair".into()))?;
                match groups.iter_mut().find(|(existing, _, _)| existing == k) {
                    Some((_, values, tag)) => {
                        values.push(v.clone());
                        tag.union_with(&t.tag);
                    }
                    None => groups.push((k.clone(), vec![v.clone()], t.tag.clone())),
                }
            }
            Ok(vec![groups
                .into_iter()
                .map(|(k, values, tag)| Tagged::new(Value::pair(k, Value::List(values)), tag))
                .collect()])
        }
        Transform::ReduceByKey { parent, r: reducer } => {
            let input = parent_tagged.get(parent).ok_or_else(|| missing_parent(r))?;
            let flat: Vec<&Tagged<Value>> = input.iter().flatten().collect();
            let mut reduced: Vec<(Value, Value, Tag)> = Vec::new();
            for t in flat {
                let (k, v) = t
                    .elem
                    .as_pair()
                    .ok_or_else(|| LineageError::EngineFailure("reduce_by_key input is not a pair".into()))?;
                match reduced.iter_mut().find(|(existing, _, _)| existing == k) {
                    Some((_, acc, tag)) => {
                        *acc = reducer(acc, v);
                        tag.union_with(&t.tag);
                    }
                    None => reduced.push((k.clone(), v.clone(), t.tag.clone())),
                }
            }
            Ok(vec![reduced.into_iter().map(|(k, v, tag)| Tagged::new(Value::pair(k, v), tag)).collect()])
        }
        Transform::Raw { .. } => Err(LineageError::UnsupportedLineageOp { dataset: r, op: transform.op_name() }),
    }
}

fn missing_parent(dataset: DatasetId) -> LineageError {
    LineageError::EngineFailure(format!("dataset {dataset} lifted before its parent was tagged"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    #[test]
    fn group_by_key_merges_tags_of_values_sharing_a_key() {
        let mut engine = Engine::new();
        let s = engine.new_source(vec![vec![
            Value::pair(Value::Str("k1".into()), Value::Int(1)),
            Value::pair(Value::Str("k1".into()), Value::Int(2)),
            Value::pair(Value::Str("k2".into()), Value::Int(3)),
        ]]);
        let grouped = engine.group_by_key(s).unwrap();

        let tagged = propagate(&engine, grouped, s, None).unwrap();
        let flat: Vec<_> = tagged.into_iter().flatten().collect();
        let k1 = flat.iter().find(|t| t.elem.as_pair().unwrap().0 == &Value::Str("k1".into())).unwrap();
        assert_eq!(k1.tag.len(), 2);
        let k2 = flat.iter().find(|t| t.elem.as_pair().unwrap().0 == &Value::Str("k2".into())).unwrap();
        assert_eq!(k2.tag.len(), 1);
    }

    #[test]
    fn union_keeps_each_elements_own_origin_tag() {
        let mut engine = Engine::new();
        let a = engine.new_source(vec![vec![Value::Int(1)]]);
        let b = engine.new_source(vec![vec![Value::Int(2)]]);
        let u = engine.union(vec![a, b]).unwrap();

        let tagged_a = crate::unique_tag::unique_tag(&engine, a).unwrap();
        let tagged_b = crate::unique_tag::unique_tag(&engine, b).unwrap();
        let mut parents = FnvHashMap::default();
        parents.insert(a, tagged_a);
        parents.insert(b, tagged_b);
        let tagged_u = apply_transform(&engine, u, &parents).unwrap();
        let flat: Vec<_> = tagged_u.into_iter().flatten().collect();
        assert_eq!(flat.len(), 2);
        assert!(flat.iter().all(|t| t.tag.is_non_empty()));
    }

    #[test]
    fn raw_transform_has_no_lift_case() {
        let mut engine = Engine::new();
        let s = engine.new_source(vec![vec![Value::Int(1)]]);
        let raw = engine.raw(s).unwrap();
        let err = propagate(&engine, raw, s, None).unwrap_err();
        assert!(matches!(err, LineageError::UnsupportedLineageOp { .. }));
    }
}
