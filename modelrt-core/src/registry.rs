//! Instance registry: (kind, id) -> instance.

use crate::instance::{downcast, Entity, InstanceId, Kind};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Instances of one kind, kept in insertion order.
#[derive(Default)]
struct KindTable {
    next_seq: u64,
    ordered: BTreeMap<u64, Arc<dyn Entity>>,
    index: HashMap<InstanceId, u64>,
}

impl KindTable {
    fn insert(&mut self, entity: Arc<dyn Entity>) {
        let id = entity.id().clone();
        // Overwrites keep the slot of the instance they replace.
        let seq = match self.index.get(&id) {
            Some(seq) => *seq,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.index.insert(id, seq);
                seq
            }
        };
        self.ordered.insert(seq, entity);
    }

    fn remove(&mut self, id: &InstanceId) -> Option<Arc<dyn Entity>> {
        let seq = self.index.remove(id)?;
        self.ordered.remove(&seq)
    }
}

/// Owns every instance, grouped by kind.
///
/// Each kind is locked independently; every operation is atomic on its own.
/// Missing kinds behave as empty collections.
#[derive(Default)]
pub struct InstanceRegistry {
    kinds: DashMap<Kind, KindTable>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a kind. Idempotent.
    pub fn register_kind(&self, kind: &Kind) {
        self.kinds.entry(kind.clone()).or_default();
    }

    /// Stores an instance under its own handle, replacing any instance
    /// already stored at that id.
    pub fn create(&self, entity: Arc<dyn Entity>) {
        let kind = entity.kind().clone();
        tracing::trace!("create {}", entity.handle());
        self.kinds.entry(kind).or_default().insert(entity);
    }

    /// Finds an instance by kind and id.
    pub fn find(&self, kind: &Kind, id: &InstanceId) -> Option<Arc<dyn Entity>> {
        let table = self.kinds.get(kind)?;
        let seq = table.index.get(id)?;
        table.ordered.get(seq).cloned()
    }

    /// Finds an instance and downcasts it to its concrete type.
    pub fn find_as<T: Entity>(&self, kind: &Kind, id: &InstanceId) -> Option<Arc<T>> {
        self.find(kind, id).and_then(downcast::<T>)
    }

    /// Snapshot of all instances of a kind in insertion order.
    pub fn select_all(&self, kind: &Kind) -> Vec<Arc<dyn Entity>> {
        self.kinds
            .get(kind)
            .map(|table| table.ordered.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Typed variant of [`select_all`](Self::select_all); instances of another
    /// concrete type are skipped.
    pub fn select_all_as<T: Entity>(&self, kind: &Kind) -> Vec<Arc<T>> {
        self.select_all(kind)
            .into_iter()
            .filter_map(downcast::<T>)
            .collect()
    }

    /// Returns some instance of the kind. Which one is not specified.
    pub fn select_any(&self, kind: &Kind) -> Option<Arc<dyn Entity>> {
        let table = self.kinds.get(kind)?;
        table.ordered.values().next().cloned()
    }

    /// Removes an instance. No-op if absent. Relationship links are left
    /// untouched.
    pub fn delete(&self, kind: &Kind, id: &InstanceId) -> Option<Arc<dyn Entity>> {
        let removed = self.kinds.get_mut(kind)?.remove(id);
        if removed.is_some() {
            tracing::trace!("delete {}:{}", kind, id);
        }
        removed
    }

    /// Number of instances of a kind.
    pub fn count(&self, kind: &Kind) -> usize {
        self.kinds.get(kind).map(|t| t.ordered.len()).unwrap_or(0)
    }

    /// All declared kinds.
    pub fn kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<Kind> = self.kinds.iter().map(|e| e.key().clone()).collect();
        kinds.sort();
        kinds
    }

    /// Drops the instances of one kind, or of every kind.
    pub fn clear(&self, kind: Option<&Kind>) {
        match kind {
            Some(kind) => {
                if let Some(mut table) = self.kinds.get_mut(kind) {
                    *table = KindTable::default();
                }
            }
            None => self.kinds.clear(),
        }
    }
}
