//! Backward trace, using-mappings strategy (§4.F) — the default. Instead
//! of materializing a concrete element set at every stage boundary (as
//! `backward_maintaining_set` does), it builds one `Mapping` per boundary:
//! a join, on element value, between the previous stage's tagged sink and
//! this stage's uniquely-tagged start. Tags of interest are then stepped
//! back one stage at a time by following the mapping, never leaving the
//! driver's broadcast state at all until the very last step selects
//! concrete elements of `source`.

use fnv::FnvHashMap;
use tracing::instrument;

use crate::dataset::DatasetId;
use crate::engine::Engine;
use crate::error::Result;
use crate::stage::{stage_walk, start_unique_tag, StageRecord};
use crate::tag::Tag;
use crate::tagged::TaggedPartitions;
use crate::unique_tag::unique_tag;
use crate::value::Value;

use super::{reduce_matches, select_by_tag};

/// Joins `prev_end`'s tagged elements with `this_start`'s uniquely-tagged
/// elements on their `Value`, producing a lookup from "this stage's own
/// element identity" back to "the tag this value carried one stage
/// earlier". Values repeated within a stage (e.g. a `groupByKey` key
/// revisited across shuffle partitions) fold their previous-stage tags
/// together, which only ever widens the traced set — never narrows it
/// incorrectly.
fn build_mapping(prev_end: &TaggedPartitions) -> FnvHashMap<Value, Tag> {
    let mut by_value: FnvHashMap<Value, Tag> = FnvHashMap::default();
    for tagged in prev_end.iter().flatten() {
        by_value.entry(tagged.elem.clone()).or_insert_with(Tag::empty).union_with(&tagged.tag);
    }
    by_value
}

/// Steps a tag-of-interest set, expressed in `this_start`'s own unique-tag
/// space, back one stage into `prev_end`'s tag space, via `mapping`.
fn step_back(this_start: &TaggedPartitions, of_interest: &Tag, mapping: &FnvHashMap<Value, Tag>) -> Tag {
    let mut stepped = Tag::empty();
    for tagged in this_start.iter().flatten() {
        if tagged.tag.intersect(of_interest).is_non_empty() {
            if let Some(prev_tag) = mapping.get(&tagged.elem) {
                stepped.union_with(prev_tag);
            }
        }
    }
    stepped
}

#[instrument(name = "trace_backward_using_mappings", skip(engine, predicate))]
pub fn trace_backward_using_mappings(
    engine: &Engine,
    source: DatasetId,
    predicate: &dyn Fn(&Value) -> bool,
    sink: DatasetId,
) -> Result<Vec<Value>> {
    if source == sink {
        return Ok(engine.evaluate(source)?.into_iter().flatten().filter(|v| predicate(v)).collect());
    }

    let stages = stage_walk(engine, source, sink)?;
    if stages.is_empty() {
        return Ok(Vec::new());
    }

    let last: &StageRecord = stages.last().expect("checked non-empty above");
    let mut of_interest = reduce_matches(&last.tagged_end, predicate);

    // Fold the stage list from last to first, stepping `of_interest` back
    // through one `Mapping` per boundary. After the last iteration
    // `of_interest` lives in `stages[0]`'s start's unique-tag space, which
    // is exactly `unique_tag(source)`'s space since `stages[0].start ==
    // source`.
    for i in (1..stages.len()).rev() {
        let this_start_tagged = start_unique_tag(engine, &stages[i])?;
        let mapping = build_mapping(&stages[i - 1].tagged_end);
        of_interest = step_back(&this_start_tagged, &of_interest, &mapping);
    }

    let source_tagged = unique_tag(engine, source)?;
    Ok(select_by_tag(&source_tagged, &of_interest))
}
