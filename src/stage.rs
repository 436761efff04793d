//! The stage walker (§4.E): decomposes the path from `source` to `sink`
//! into stages separated by shuffle boundaries, tagging each stage's end
//! from a freshly uniquely-tagged start.
//!
//! The outer per-stage loop is iterative (a bounded work-stack rather than
//! native recursion bounded only by the OS stack), the same iterative-
//! worklist shape `fogti-esvc-core`'s `Graph::debug_exec_order` uses for
//! its own DAG walk — a pathologically long stage chain fails by
//! exhausting a `Vec`, not by overflowing the call stack.
//!
//! Within a single stage, `tag_within_stage` recurses only across narrow
//! edges: a dataset reached by recursion that itself depends on a shuffle
//! belongs to an *earlier* stage, so it stops there and hands back a fresh
//! `unique_tag` rather than lifting through the shuffle. The one dataset
//! allowed to lift through its own shuffle dependency is the stage's own
//! `current_end` — the entry point `stage_walk` is resolving this
//! iteration — which is why `tag_within_stage` carries an explicit
//! `is_entry` flag instead of inferring it from the recursion shape.

use fnv::{FnvHashMap, FnvHashSet};

use crate::dataset::{DatasetId, DependencyKind};
use crate::engine::Engine;
use crate::error::{LineageError, Result};
use crate::lift::apply_transform;
use crate::tagged::TaggedPartitions;
use crate::unique_tag::unique_tag;

#[derive(Clone, Debug)]
pub struct StageRecord {
    pub start: DatasetId,
    pub end: DatasetId,
    pub tagged_end: TaggedPartitions,
}

/// Walks the dependency DAG from `source` to `sink`, returning the stages
/// in order from `source`'s side to `sink`'s side. Empty if `source ==
/// sink` or `sink` isn't reachable from `source`.
pub fn stage_walk(engine: &Engine, source: DatasetId, sink: DatasetId) -> Result<Vec<StageRecord>> {
    let mut records = Vec::new();
    let mut current_end = sink;
    loop {
        if current_end == source || !engine.reachable(source, current_end)? {
            break;
        }
        let boundary = engine.parent_stage_set(current_end)?;
        let (tagged_end, first_in_stage) = tag_within_stage(engine, current_end, source, &boundary, true)?;
        records.push(StageRecord { start: first_in_stage, end: current_end, tagged_end });
        current_end = first_in_stage;
    }
    records.reverse();
    Ok(records)
}

/// Tags `r` back to the start of its stage. `is_entry` is true only for the
/// dataset `stage_walk` is resolving this iteration; every recursive
/// sub-call passes `false`, which is what lets a shuffle-consuming dataset
/// reached mid-recursion stop and defer to an earlier stage instead of
/// being lifted through.
fn tag_within_stage(
    engine: &Engine,
    r: DatasetId,
    source: DatasetId,
    boundary: &FnvHashSet<DatasetId>,
    is_entry: bool,
) -> Result<(TaggedPartitions, DatasetId)> {
    if !engine.reachable(source, r)? {
        return Ok((crate::unique_tag::all_empty(engine, r)?, source));
    }
    if r == source {
        return Ok((unique_tag(engine, r)?, r));
    }
    if boundary.contains(&r) {
        return Ok((unique_tag(engine, r)?, r));
    }
    let deps = engine.dependencies(r)?.to_vec();
    let has_shuffle_dep = deps.iter().any(|dep| dep.kind == DependencyKind::Shuffle);
    if has_shuffle_dep && !is_entry {
        return Ok((unique_tag(engine, r)?, r));
    }
    let mut firsts = Vec::with_capacity(deps.len());
    let mut parent_tagged: FnvHashMap<DatasetId, TaggedPartitions> = FnvHashMap::default();
    for dep in &deps {
        let (tagged_parent, first) = tag_within_stage(engine, dep.parent, source, boundary, false)?;
        firsts.push(first);
        parent_tagged.insert(dep.parent, tagged_parent);
    }
    let that_first = firsts.into_iter().max().ok_or(LineageError::CyclicLineage { dataset: r })?;
    let lifted = apply_transform(engine, r, &parent_tagged)?;
    Ok((lifted, that_first))
}

/// The unique tagging of a stage's start dataset — recomputed rather than
/// threaded through `stage_walk`'s return value, since it's exactly what
/// `tag_within_stage` computed internally for that boundary and is cheap
/// to reproduce deterministically.
pub fn start_unique_tag(engine: &Engine, stage: &StageRecord) -> Result<TaggedPartitions> {
    unique_tag(engine, stage.start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn single_narrow_chain_is_one_stage() {
        let mut engine = Engine::new();
        let s = engine.new_source(vec![vec![Value::Int(1), Value::Int(2)]]);
        let m = engine.map(s, |v| Value::Int(v.as_int().unwrap() + 1)).unwrap();
        let stages = stage_walk(&engine, s, m).unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].start, s);
        assert_eq!(stages[0].end, m);
    }

    #[test]
    fn shuffle_introduces_a_new_stage() {
        let mut engine = Engine::new();
        let s = engine.new_source(vec![vec![Value::pair(Value::Int(1), Value::Int(10))]]);
        let reduced = engine.reduce_by_key(s, |a, b| Value::Int(a.as_int().unwrap() + b.as_int().unwrap())).unwrap();
        let sink = engine.map(reduced, |v| v.clone()).unwrap();
        let stages = stage_walk(&engine, s, sink).unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].start, s);
        assert_eq!(stages[0].end, reduced);
        assert_eq!(stages[1].start, reduced);
        assert_eq!(stages[1].end, sink);
    }

    #[test]
    fn same_source_and_sink_is_empty() {
        let mut engine = Engine::new();
        let s = engine.new_source(vec![vec![Value::Int(1)]]);
        assert!(stage_walk(&engine, s, s).unwrap().is_empty());
    }
}
