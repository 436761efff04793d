//! Backward trace, single-step strategy (§4.F): uniquely tag `source`,
//! propagate through to `sink` in one pass ignoring stage boundaries, fold
//! the matches' tags into a broadcast set, then re-tag `source` and select
//! by intersection. Correct across any number of stages, but every shuffle
//! the path crosses can inflate the broadcast tag set — no stage boundary
//! ever gets to make the set of interesting elements concrete again before
//! the next shuffle's union.

use tracing::instrument;

use crate::dataset::DatasetId;
use crate::engine::Engine;
use crate::error::Result;
use crate::lift::propagate;
use crate::unique_tag::unique_tag;
use crate::value::Value;

use super::{reduce_matches, select_by_tag};

#[instrument(name = "trace_backward_single_step", skip(engine, predicate))]
pub fn trace_backward_single_step(
    engine: &Engine,
    source: DatasetId,
    predicate: &dyn Fn(&Value) -> bool,
    sink: DatasetId,
) -> Result<Vec<Value>> {
    let tagged_source = unique_tag(engine, source)?;
    let tagged_sink = propagate(engine, sink, source, Some(&tagged_source))?;
    let of_interest = reduce_matches(&tagged_sink, predicate);

    // Re-derive rather than reuse `tagged_source`: `unique_tag` is required
    // to be deterministic (§4.D), and re-tagging here keeps this strategy
    // honest about depending on that guarantee rather than on holding onto
    // the first tagging.
    let tagged_source_again = unique_tag(engine, source)?;
    Ok(select_by_tag(&tagged_source_again, &of_interest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_single_step_through_a_map() {
        let mut engine = Engine::new();
        let s = engine.new_source(vec![vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4), Value::Int(5)]]);
        let doubled = engine.map(s, |v| Value::Int(v.as_int().unwrap() * 2)).unwrap();

        let matched = trace_backward_single_step(&engine, s, &|v| matches!(v, Value::Int(10)), doubled).unwrap();
        assert_eq!(matched, vec![Value::Int(5)]);
    }

    #[test]
    fn backward_single_step_through_cartesian_pulls_in_every_element_on_both_sides() {
        let mut engine = Engine::new();
        let a = engine.new_source(vec![vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4), Value::Int(5)]]);
        let b = engine.new_source(vec![vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4), Value::Int(5)]]);
        let product = engine.cartesian(a, b).unwrap();
        let sums = engine
            .map(product, |v| {
                let (x, y) = v.as_pair().unwrap();
                Value::Int(x.as_int().unwrap() + y.as_int().unwrap())
            })
            .unwrap();

        let mut into_a = trace_backward_single_step(&engine, a, &|v| matches!(v, Value::Int(6)), sums).unwrap();
        into_a.sort();
        assert_eq!(into_a, vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4), Value::Int(5)]);
    }
}
