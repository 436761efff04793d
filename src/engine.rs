//! A single-threaded, in-process implementation of the `engine` contract
//! (§4.I): enough of a dataflow engine to register datasets, evaluate them,
//! and answer the dependency/reachability queries the stage walker and
//! lifter need. It is not the dataflow engine the core is meant to sit
//! next to — it exists so this crate is directly testable without one,
//! the way `differential-dataflow`'s own operators ship against real
//! `timely` scopes rather than a mocked one.

use std::cell::RefCell;
use std::rc::Rc;

use fnv::{FnvHashMap, FnvHashSet};

use crate::dataset::{Dataset, DatasetId, DatasetRecord, Dependency, DependencyKind, Transform};
use crate::error::{LineageError, Result};
use crate::value::Value;

/// Partitioned, concrete dataset contents: one `Vec<Value>` per partition.
pub type Partitions = Vec<Vec<Value>>;

pub struct Engine {
    next_id: DatasetId,
    records: FnvHashMap<DatasetId, DatasetRecord>,
    sources: FnvHashMap<DatasetId, Partitions>,
    cache: RefCell<FnvHashMap<DatasetId, Partitions>>,
    shuffle_partitions: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            next_id: 0,
            records: FnvHashMap::default(),
            sources: FnvHashMap::default(),
            cache: RefCell::new(FnvHashMap::default()),
            shuffle_partitions: 4,
        }
    }

    fn allocate(&mut self, transform: Transform, partitions: usize) -> DatasetId {
        let id = self.next_id;
        self.next_id += 1;
        self.records.insert(id, DatasetRecord::new(id, transform, partitions));
        id
    }

    pub fn new_source(&mut self, partitions: Partitions) -> DatasetId {
        let count = partitions.len().max(1);
        let id = self.allocate(Transform::Source, count);
        self.sources.insert(id, partitions);
        id
    }

    pub fn map(&mut self, parent: DatasetId, f: impl Fn(&Value) -> Value + 'static) -> Result<DatasetId> {
        let partitions = self.partitions(parent)?;
        Ok(self.allocate(Transform::Map { parent, f: Rc::new(f) }, partitions))
    }

    pub fn filter(&mut self, parent: DatasetId, p: impl Fn(&Value) -> bool + 'static) -> Result<DatasetId> {
        let partitions = self.partitions(parent)?;
        Ok(self.allocate(Transform::Filter { parent, p: Rc::new(p) }, partitions))
    }

    pub fn flat_map(&mut self, parent: DatasetId, f: impl Fn(&Value) -> Vec<Value> + 'static) -> Result<DatasetId> {
        let partitions = self.partitions(parent)?;
        Ok(self.allocate(Transform::FlatMap { parent, f: Rc::new(f) }, partitions))
    }

    pub fn union(&mut self, parents: Vec<DatasetId>) -> Result<DatasetId> {
        let mut total = 0;
        for &parent in &parents {
            total += self.partitions(parent)?;
        }
        Ok(self.allocate(Transform::Union { parents }, total.max(1)))
    }

    pub fn cartesian(&mut self, left: DatasetId, right: DatasetId) -> Result<DatasetId> {
        self.partitions(left)?;
        self.partitions(right)?;
        Ok(self.allocate(Transform::Cartesian { left, right }, 1))
    }

    pub fn group_by_key(&mut self, parent: DatasetId) -> Result<DatasetId> {
        self.partitions(parent)?;
        let partitions = self.shuffle_partitions;
        Ok(self.allocate(Transform::GroupByKey { parent }, partitions))
    }

    pub fn reduce_by_key(
        &mut self,
        parent: DatasetId,
        r: impl Fn(&Value, &Value) -> Value + 'static,
    ) -> Result<DatasetId> {
        self.partitions(parent)?;
        let partitions = self.shuffle_partitions;
        Ok(self.allocate(Transform::ReduceByKey { parent, r: Rc::new(r) }, partitions))
    }

    /// Registers a transformation the engine can run but that the lifter
    /// has no lift case for yet (§4.C, §8 scenario 6) — used by tests to
    /// exercise `UnsupportedLineageOp` without touching the closed set of
    /// variants the lifter does know how to handle.
    pub fn raw(&mut self, parent: DatasetId) -> Result<DatasetId> {
        let partitions = self.partitions(parent)?;
        Ok(self.allocate(Transform::Raw { parent }, partitions))
    }

    fn record(&self, id: DatasetId) -> Result<&DatasetRecord> {
        self.records
            .get(&id)
            .ok_or_else(|| LineageError::EngineFailure(format!("unknown dataset {id}")))
    }

    pub fn dependencies(&self, id: DatasetId) -> Result<&[Dependency]> {
        Ok(self.record(id)?.dependencies())
    }

    pub fn partitions(&self, id: DatasetId) -> Result<usize> {
        Ok(self.record(id)?.partitions())
    }

    pub fn transform(&self, id: DatasetId) -> Result<&Transform> {
        Ok(&self.record(id)?.transform)
    }

    /// Depth-first reachability from `source` down to `target` following
    /// dependency edges, detecting cycles along the current path rather
    /// than merely the visited set (a node may be safely revisited via a
    /// different path — a diamond is not a cycle).
    pub fn reachable(&self, source: DatasetId, target: DatasetId) -> Result<bool> {
        let mut on_path = FnvHashSet::default();
        let mut memo = FnvHashSet::default();
        self.reachable_rec(source, target, &mut on_path, &mut memo)
    }

    fn reachable_rec(
        &self,
        source: DatasetId,
        node: DatasetId,
        on_path: &mut FnvHashSet<DatasetId>,
        memo: &mut FnvHashSet<DatasetId>,
    ) -> Result<bool> {
        if node == source {
            return Ok(true);
        }
        if memo.contains(&node) {
            return Ok(false);
        }
        if !on_path.insert(node) {
            return Err(LineageError::CyclicLineage { dataset: node });
        }
        let mut found = false;
        for dep in self.dependencies(node)? {
            if self.reachable_rec(source, dep.parent, on_path, memo)? {
                found = true;
                break;
            }
        }
        on_path.remove(&node);
        if !found {
            memo.insert(node);
        }
        Ok(found)
    }

    /// BFS across narrow edges from `root`, stopping at shuffle edges and
    /// collecting their far-side (pre-shuffle) dataset ids — the boundary
    /// the stage walker treats as "already tagged" when it reaches them.
    pub fn parent_stage_set(&self, root: DatasetId) -> Result<FnvHashSet<DatasetId>> {
        let mut visited = FnvHashSet::default();
        let mut frontier = vec![root];
        let mut boundary = FnvHashSet::default();
        while let Some(node) = frontier.pop() {
            if !visited.insert(node) {
                continue;
            }
            for dep in self.dependencies(node)? {
                match dep.kind {
                    DependencyKind::Narrow => frontier.push(dep.parent),
                    DependencyKind::Shuffle => {
                        boundary.insert(dep.parent);
                    }
                }
            }
        }
        Ok(boundary)
    }

    /// Materializes a dataset's untagged partitions, memoized per engine
    /// instance — re-running `evaluate` on the same id always returns the
    /// same result, which is what lets the reference engine stand in for
    /// a real cluster's "collect" without reintroducing nondeterminism.
    pub fn evaluate(&self, id: DatasetId) -> Result<Partitions> {
        let mut on_path = FnvHashSet::default();
        self.evaluate_rec(id, &mut on_path)
    }

    fn evaluate_rec(&self, id: DatasetId, on_path: &mut FnvHashSet<DatasetId>) -> Result<Partitions> {
        if let Some(hit) = self.cache.borrow().get(&id) {
            return Ok(hit.clone());
        }
        if !on_path.insert(id) {
            return Err(LineageError::CyclicLineage { dataset: id });
        }
        let transform = self.transform(id)?.clone();
        let result = match &transform {
            Transform::Source => self
                .sources
                .get(&id)
                .cloned()
                .ok_or_else(|| LineageError::EngineFailure(format!("source {id} has no data")))?,
            Transform::Map { parent, f } => self
                .evaluate_rec(*parent, on_path)?
                .into_iter()
                .map(|part| part.iter().map(|v| f(v)).collect())
                .collect(),
            Transform::Filter { parent, p } => self
                .evaluate_rec(*parent, on_path)?
                .into_iter()
                .map(|part| part.into_iter().filter(|v| p(v)).collect())
                .collect(),
            Transform::FlatMap { parent, f } => self
                .evaluate_rec(*parent, on_path)?
                .into_iter()
                .map(|part| part.iter().flat_map(|v| f(v)).collect())
                .collect(),
            Transform::Union { parents } => {
                let mut out = Vec::new();
                for &parent in parents {
                    out.extend(self.evaluate_rec(parent, on_path)?);
                }
                out
            }
            Transform::Cartesian { left, right } => {
                let left_vals: Vec<Value> = self.evaluate_rec(*left, on_path)?.into_iter().flatten().collect();
                let right_vals: Vec<Value> = self.evaluate_rec(*right, on_path)?.into_iter().flatten().collect();
                let mut out = Vec::with_capacity(left_vals.len() * right_vals.len());
                for a in &left_vals {
                    for b in &right_vals {
                        out.push(Value::pair(a.clone(), b.clone()));
                    }
                }
                vec![out]
            }
            Transform::GroupByKey { parent } => {
                let flat: Vec<Value> = self.evaluate_rec(*parent, on_path)?.into_iter().flatten().collect();
                let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
                for v in flat {
                    let (k, val) = v
                        .as_pair()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .ok_or_else(|| LineageError::EngineFailure("group_by_key input is not a pair".into()))?;
                    match groups.iter_mut().find(|(existing, _)| existing == &k) {
                        Some((_, values)) => values.push(val),
                        None => groups.push((k, vec![val])),
                    }
                }
                self.partition_by_key(groups.into_iter().map(|(k, values)| Value::pair(k, Value::List(values))))
            }
            Transform::ReduceByKey { parent, r } => {
                let flat: Vec<Value> = self.evaluate_rec(*parent, on_path)?.into_iter().flatten().collect();
                let mut reduced: Vec<(Value, Value)> = Vec::new();
                for v in flat {
                    let (k, val) = v
                        .as_pair()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .ok_or_else(|| LineageError::EngineFailure("reduce_by_key input is not a pair".into()))?;
                    match reduced.iter_mut().find(|(existing, _)| existing == &k) {
                        Some((_, acc)) => *acc = r(acc, &val),
                        None => reduced.push((k, val)),
                    }
                }
                self.partition_by_key(reduced.into_iter().map(|(k, v)| Value::pair(k, v)))
            }
            Transform::Raw { parent } => self.evaluate_rec(*parent, on_path)?,
        };
        on_path.remove(&id);
        self.cache.borrow_mut().insert(id, result.clone());
        Ok(result)
    }

    fn partition_by_key(&self, records: impl Iterator<Item = Value>) -> Partitions {
        let mut out = vec![Vec::new(); self.shuffle_partitions.max(1)];
        for (i, record) in records.enumerate() {
            let slot = i % out.len();
            out[slot].push(record);
        }
        out
    }
}
