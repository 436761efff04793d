//! Backward trace, maintaining-set strategy (§4.F): walk the stages from
//! `sink` back to `source`, and at every shuffle boundary collapse "tags
//! of interest" down into a concrete set of elements before crossing to
//! the next stage. Each stage boundary costs one driver-side
//! materialization, but the tag-union that crosses a shuffle never grows
//! past what a single stage contributes, unlike the single-step strategy.

use fnv::FnvHashSet;
use tracing::instrument;

use crate::dataset::DatasetId;
use crate::engine::Engine;
use crate::error::Result;
use crate::stage::{stage_walk, start_unique_tag};
use crate::value::Value;

use super::{reduce_matches, select_by_tag};

#[instrument(name = "trace_backward_maintaining_set", skip(engine, predicate))]
pub fn trace_backward_maintaining_set(
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

    // `current` narrows one stage at a time, starting from the caller's
    // predicate over `sink` and ending as a predicate over `source`'s own
    // elements. Boxing lets each iteration replace it with a closure that
    // owns the concrete set it just materialized.
    let mut current: Box<dyn Fn(&Value) -> bool> = Box::new(predicate);
    for stage in stages.iter().rev() {
        let of_interest = reduce_matches(&stage.tagged_end, &*current);
        let start_tagged = start_unique_tag(engine, stage)?;
        let set: FnvHashSet<Value> = select_by_tag(&start_tagged, &of_interest).into_iter().collect();
        current = Box::new(move |v: &Value| set.contains(v));
    }

    Ok(engine.evaluate(source)?.into_iter().flatten().filter(|v| current(v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maintaining_set_through_a_reduce_by_key() {
        let mut engine = Engine::new();
        // k2's value is distinct from k1's reduced sum (`4` rather than
        // `3`) since `E`'s elements carry no identity beyond their value —
        // if k2 also reduced to `3`, the predicate below could not tell
        // k1's `3` from k2's and both would correctly match.
        let s = engine.new_source(vec![vec![
            Value::pair(Value::Str("k1".into()), Value::Int(1)),
            Value::pair(Value::Str("k1".into()), Value::Int(2)),
            Value::pair(Value::Str("k2".into()), Value::Int(4)),
        ]]);
        let reduced = engine.reduce_by_key(s, |a, b| Value::Int(a.as_int().unwrap() + b.as_int().unwrap())).unwrap();
        let sink = engine.map(reduced, |v| v.as_pair().unwrap().1.clone()).unwrap();

        let mut matched = trace_backward_maintaining_set(&engine, s, &|v| matches!(v, Value::Int(3)), sink).unwrap();
        matched.sort();
        assert_eq!(
            matched,
            vec![Value::pair(Value::Str("k1".into()), Value::Int(1)), Value::pair(Value::Str("k1".into()), Value::Int(2))]
        );
    }

    #[test]
    fn maintaining_set_same_source_and_sink_just_filters() {
        let mut engine = Engine::new();
        let s = engine.new_source(vec![vec![Value::Int(1), Value::Int(2), Value::Int(3)]]);
        let matched = trace_backward_maintaining_set(&engine, s, &|v| matches!(v, Value::Int(n) if *n > 1), s).unwrap();
        assert_eq!(matched, vec![Value::Int(2), Value::Int(3)]);
    }
}
