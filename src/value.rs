//! The closed element-value type the reference engine executes over.
//!
//! Real dataflow engines parametrize over an arbitrary element type; this
//! crate is given the lineage-tracing core alone, so `engine::memory` needs
//! *something* concrete to run user closures over. `Value` is that
//! something. Nothing in `lift` or the trace strategies inspects it —
//! they only move the `Tag` riding alongside it — so this concretization
//! never leaks into the algebra.

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Unit,
    Int(i64),
    Str(String),
    Pair(Box<Value>, Box<Value>),
    List(Vec<Value>),
}

impl Value {
    pub fn pair(a: Value, b: Value) -> Value {
        Value::Pair(Box::new(a), Box::new(b))
    }

    pub fn as_pair(&self) -> Option<(&Value, &Value)> {
        match self {
            Value::Pair(a, b) => Some((a, b)),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }
}
