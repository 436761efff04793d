//! The trace engine (§4.F): four strategies for answering "which elements
//! of the other dataset does this one depend on (or feed into)", each
//! trading data movement against engine round-trips differently.
//!
//! All four are built on the same three primitives: `unique_tag` (§4.D),
//! `lift::propagate` / `stage::stage_walk` (§4.C/§4.E), and the
//! `reduce_matches` helper below, which every backward strategy uses to
//! collapse the tags of the elements a predicate matched into one
//! broadcast tag set.

pub mod backward_maintaining_set;
pub mod backward_single_step;
pub mod backward_using_mappings;
pub mod forward;

use crate::dataset::DatasetId;
use crate::engine::Engine;
use crate::error::Result;
use crate::tag::Tag;
use crate::tagged::TaggedPartitions;
use crate::value::Value;

/// Which backward-trace strategy to run (§4.F). `UsingMappings` is the
/// default: it best balances data movement per the spec's own guidance,
/// keeping tag sets small without a driver-side materialization at every
/// stage boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackwardStrategy {
    SingleStep,
    MaintainingSet,
    UsingMappings,
}

impl Default for BackwardStrategy {
    fn default() -> Self {
        BackwardStrategy::UsingMappings
    }
}

/// Dispatches to one of the three backward-trace strategies. All three
/// answer the same query (§8: they must agree on every reachable `S`,
/// `E`); callers pick based on how many stages separate `source` from
/// `sink` and how large the broadcast tag sets would get.
pub fn trace_backward(
    engine: &Engine,
    source: DatasetId,
    predicate: &dyn Fn(&Value) -> bool,
    sink: DatasetId,
    strategy: BackwardStrategy,
) -> Result<Vec<Value>> {
    match strategy {
        BackwardStrategy::SingleStep => backward_single_step::trace_backward_single_step(engine, source, predicate, sink),
        BackwardStrategy::MaintainingSet => {
            backward_maintaining_set::trace_backward_maintaining_set(engine, source, predicate, sink)
        }
        BackwardStrategy::UsingMappings => {
            backward_using_mappings::trace_backward_using_mappings(engine, source, predicate, sink)
        }
    }
}

/// Unions the tags of every element in `tagged` that `predicate` accepts —
/// the "reduce the matches' tags into a broadcast set" step every backward
/// strategy performs against its end dataset.
pub(crate) fn reduce_matches(tagged: &TaggedPartitions, predicate: &dyn Fn(&Value) -> bool) -> Tag {
    tagged
        .iter()
        .flatten()
        .filter(|t| predicate(&t.elem))
        .fold(Tag::empty(), |acc, t| acc.union(&t.tag))
}

/// Picks out the concrete elements of `tagged` whose tag intersects `of_interest`.
pub(crate) fn select_by_tag(tagged: &TaggedPartitions, of_interest: &Tag) -> Vec<Value> {
    tagged
        .iter()
        .flatten()
        .filter(|t| t.tag.intersect(of_interest).is_non_empty())
        .map(|t| t.elem.clone())
        .collect()
}
