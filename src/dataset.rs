//! The engine contract this core is built against (§6): datasets are
//! nodes in a DAG, reached from each other by narrow or shuffle
//! dependencies, each built from one of a closed set of transformations.
//!
//! This module holds the *shapes* only — `engine` owns the single
//! implementation of the contract this crate ships.

use std::rc::Rc;

use crate::value::Value;

pub type DatasetId = u64;

/// Whether a dependency can be followed one partition at a time (`Narrow`)
/// or requires an all-to-all redistribution of data (`Shuffle`). The stage
/// walker (§4.E) treats every shuffle edge as a stage boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DependencyKind {
    Narrow,
    Shuffle,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub parent: DatasetId,
}

/// A handle exposing the bare minimum the lineage core needs from a
/// dataset: its id, its dependency edges, and how many partitions it has.
/// `engine::Engine`'s own `DatasetRecord` is the one implementor this crate
/// ships; a real cluster engine would implement it over its own node type.
pub trait Dataset {
    fn id(&self) -> DatasetId;
    fn dependencies(&self) -> &[Dependency];
    fn partitions(&self) -> usize;
}

/// One of the closed set of transformations the lifter (§4.C) knows how to
/// propagate tags through. User functions (`f`, `p`, `r`) are carried as
/// opaque `Rc<dyn Fn>` — `lift` never calls them on anything but the
/// element values, and never inspects what they do.
#[derive(Clone)]
pub enum Transform {
    Source,
    Map { parent: DatasetId, f: Rc<dyn Fn(&Value) -> Value> },
    Filter { parent: DatasetId, p: Rc<dyn Fn(&Value) -> bool> },
    FlatMap { parent: DatasetId, f: Rc<dyn Fn(&Value) -> Vec<Value>> },
    Union { parents: Vec<DatasetId> },
    Cartesian { left: DatasetId, right: DatasetId },
    GroupByKey { parent: DatasetId },
    ReduceByKey { parent: DatasetId, r: Rc<dyn Fn(&Value, &Value) -> Value> },
    /// A transformation the engine knows how to evaluate but the lifter
    /// doesn't yet know how to lift — stands in for "a new dataset variant
    /// added to the engine before its lift case was written" (§4.C, §8
    /// scenario 6). The engine runs it as an identity pass-through; tracing
    /// through it always fails with `UnsupportedLineageOp`.
    Raw { parent: DatasetId },
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transform::Source => write!(f, "Source"),
            Transform::Map { parent, .. } => f.debug_struct("Map").field("parent", parent).finish(),
            Transform::Filter { parent, .. } => f.debug_struct("Filter").field("parent", parent).finish(),
            Transform::FlatMap { parent, .. } => f.debug_struct("FlatMap").field("parent", parent).finish(),
            Transform::Union { parents } => f.debug_struct("Union").field("parents", parents).finish(),
            Transform::Cartesian { left, right } => {
                f.debug_struct("Cartesian").field("left", left).field("right", right).finish()
            }
            Transform::GroupByKey { parent } => f.debug_struct("GroupByKey").field("parent", parent).finish(),
            Transform::ReduceByKey { parent, .. } => {
                f.debug_struct("ReduceByKey").field("parent", parent).finish()
            }
            Transform::Raw { parent } => f.debug_struct("Raw").field("parent", parent).finish(),
        }
    }
}

impl Transform {
    /// The name `UnsupportedLineageOp` reports when a future transform
    /// variant has no `lift` arm yet.
    pub fn op_name(&self) -> &'static str {
        match self {
            Transform::Source => "source",
            Transform::Map { .. } => "map",
            Transform::Filter { .. } => "filter",
            Transform::FlatMap { .. } => "flat_map",
            Transform::Union { .. } => "union",
            Transform::Cartesian { .. } => "cartesian",
            Transform::GroupByKey { .. } => "group_by_key",
            Transform::ReduceByKey { .. } => "reduce_by_key",
            Transform::Raw { .. } => "raw",
        }
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        match self {
            Transform::Source => vec![],
            Transform::Map { parent, .. }
            | Transform::Filter { parent, .. }
            | Transform::FlatMap { parent, .. }
            | Transform::Raw { parent } => {
                vec![Dependency { kind: DependencyKind::Narrow, parent: *parent }]
            }
            Transform::Union { parents } => parents
                .iter()
                .map(|&parent| Dependency { kind: DependencyKind::Narrow, parent })
                .collect(),
            Transform::Cartesian { left, right } => vec![
                Dependency { kind: DependencyKind::Narrow, parent: *left },
                Dependency { kind: DependencyKind::Narrow, parent: *right },
            ],
            Transform::GroupByKey { parent } | Transform::ReduceByKey { parent, .. } => {
                vec![Dependency { kind: DependencyKind::Shuffle, parent: *parent }]
            }
        }
    }
}

/// A registered dataset: its transform, its declared partition count, and
/// its dependency edges computed once from the transform at registration
/// time (so the two can never drift apart afterwards).
#[derive(Clone, Debug)]
pub struct DatasetRecord {
    pub id: DatasetId,
    pub transform: Transform,
    pub partitions: usize,
    pub dependencies: Vec<Dependency>,
}

impl DatasetRecord {
    pub fn new(id: DatasetId, transform: Transform, partitions: usize) -> Self {
        let dependencies = transform.dependencies();
        DatasetRecord { id, transform, partitions, dependencies }
    }
}

impl Dataset for DatasetRecord {
    fn id(&self) -> DatasetId {
        self.id
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    fn partitions(&self) -> usize {
        self.partitions
    }
}
