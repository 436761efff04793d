//! Forward trace (§4.F): given `S`, a predicate, and a downstream sink `E`,
//! find which elements of `E` descend from an `S` element the predicate
//! matched. A single pass, ignoring stage boundaries entirely.

use tracing::instrument;

use crate::dataset::DatasetId;
use crate::engine::Engine;
use crate::error::Result;
use crate::lift::propagate;
use crate::unique_tag::tag_by_predicate;
use crate::value::Value;

/// Returns the concrete elements of `sink` whose tag is non-empty after
/// propagating from the `source` elements `predicate` matches.
#[instrument(name = "trace_forward", skip(engine, predicate))]
pub fn trace_forward(
    engine: &Engine,
    source: DatasetId,
    predicate: &dyn Fn(&Value) -> bool,
    sink: DatasetId,
) -> Result<Vec<Value>> {
    let tagged_source = tag_by_predicate(engine, source, predicate)?;
    let tagged_sink = propagate(engine, sink, source, Some(&tagged_source))?;
    Ok(tagged_sink.into_iter().flatten().filter(|t| t.tag.is_non_empty()).map(|t| t.elem).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    #[test]
    fn forward_trace_follows_a_matching_element_through_a_map_and_filter() {
        let mut engine = Engine::new();
        let s = engine.new_source(vec![vec![Value::Int(1), Value::Int(2), Value::Int(3)]]);
        let doubled = engine.map(s, |v| Value::Int(v.as_int().unwrap() * 2)).unwrap();
        let evens = engine.filter(doubled, |v| v.as_int().unwrap() % 4 == 0).unwrap();

        let matched = trace_forward(&engine, s, &|v| matches!(v, Value::Int(2)), evens).unwrap();
        assert_eq!(matched, vec![Value::Int(4)]);
    }

    #[test]
    fn forward_trace_of_no_matches_is_empty() {
        let mut engine = Engine::new();
        let s = engine.new_source(vec![vec![Value::Int(1), Value::Int(2)]]);
        let doubled = engine.map(s, |v| Value::Int(v.as_int().unwrap() * 2)).unwrap();
        let matched = trace_forward(&engine, s, &|v| matches!(v, Value::Int(99)), doubled).unwrap();
        assert!(matched.is_empty());
    }
}
