use crate::state::entity::EntitySnapshot;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Authoritative last-known snapshot per entity.
///
/// Reads are lock-free against other entities; `put` is an atomic swap per
/// entity, so once it returns every later `get` observes the new snapshot.
/// Only the change detector writes here.
pub struct StateCache {
    entities: DashMap<String, Arc<EntitySnapshot>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
        }
    }

    /// Get entity snapshot by ID
    pub fn get(&self, entity_id: &str) -> Option<Arc<EntitySnapshot>> {
        self.entities.get(entity_id).map(|e| Arc::clone(e.value()))
    }

    /// Replace the snapshot for `entity_id`, returning what was replaced
    pub fn put(
        &self,
        entity_id: &str,
        snapshot: Arc<EntitySnapshot>,
    ) -> Option<Arc<EntitySnapshot>> {
        self.entities.insert(entity_id.to_string(), snapshot)
    }

    /// Drop an entity that disappeared upstream
    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntitySnapshot>> {
        self.entities.remove(entity_id).map(|(_, snapshot)| snapshot)
    }

    /// Keep only the given entity ids (full resync); returns how many were dropped
    pub fn retain_ids(&self, keep: &HashSet<String>) -> usize {
        let before = self.entities.len();
        self.entities.retain(|id, _| keep.contains(id));
        before.saturating_sub(self.entities.len())
    }

    /// Get all snapshots
    pub fn all(&self) -> Vec<Arc<EntitySnapshot>> {
        self.entities.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}
