use crate::state::cache::StateCache;
use crate::state::entity::{ChangeEvent, EntitySnapshot};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Computes diffs between incoming snapshots and the cache, then swaps the
/// cache to the incoming snapshot.
pub struct ChangeDetector {
    cache: Arc<StateCache>,
}

impl ChangeDetector {
    pub fn new(cache: Arc<StateCache>) -> Self {
        Self { cache }
    }

    /// Diff `snapshot` against the cached one and store it.
    ///
    /// A first sighting yields a presence event: no previous snapshot, no
    /// state change, no changed attributes.
    pub fn detect(
        &self,
        entity_id: &str,
        snapshot: EntitySnapshot,
        now: DateTime<Utc>,
    ) -> ChangeEvent {
        let current = Arc::new(snapshot);
        let previous = self.cache.put(entity_id, Arc::clone(&current));

        let (state_changed, changed_attributes) = match previous.as_deref() {
            Some(prev) => (
                prev.state != current.state,
                diff_attributes(&prev.attributes, &current.attributes),
            ),
            None => (false, BTreeSet::new()),
        };

        ChangeEvent {
            entity_id: entity_id.to_string(),
            previous,
            current,
            changed_attributes,
            state_changed,
            detected_at: now,
        }
    }
}

/// Names of attributes whose values differ; a key on one side only counts.
pub fn diff_attributes(
    previous: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> BTreeSet<String> {
    let mut changed: BTreeSet<String> = previous
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();

    changed.extend(
        current
            .keys()
            .filter(|key| !previous.contains_key(*key))
            .cloned(),
    );

    changed
}
