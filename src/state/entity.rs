use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Complete state of one entity at a point in time.
///
/// Snapshots are replaced wholesale in the cache, never mutated in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    /// Entity identifier (e.g., "light.kitchen", "sensor.temp")
    pub entity_id: String,

    /// State value as reported upstream ("on", "21.5", "unavailable", ...)
    pub state: String,

    /// Attribute map (domain-specific)
    #[serde(default)]
    pub attributes: HashMap<String, Value>,

    /// When the state value last changed
    pub last_changed: DateTime<Utc>,

    /// When the state or any attribute last changed
    pub last_updated: DateTime<Utc>,
}

impl EntitySnapshot {
    /// Snapshot with no attributes, both timestamps set to `at`
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: HashMap::new(),
            last_changed: at,
            last_updated: at,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// Diff between an incoming snapshot and the cached one
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub entity_id: String,

    /// Absent on first sighting
    pub previous: Option<Arc<EntitySnapshot>>,

    pub current: Arc<EntitySnapshot>,

    /// Attribute names whose values differ (including added/removed keys)
    pub changed_attributes: BTreeSet<String>,

    pub state_changed: bool,

    /// Detection time (engine clock)
    pub detected_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Synthetic "checked, nothing new" record for an entity's current snapshot
    pub fn unchanged(snapshot: Arc<EntitySnapshot>, now: DateTime<Utc>) -> Self {
        Self {
            entity_id: snapshot.entity_id.clone(),
            previous: None,
            current: snapshot,
            changed_attributes: BTreeSet::new(),
            state_changed: false,
            detected_at: now,
        }
    }

    /// True if the state value or at least one attribute differs
    pub fn is_change(&self) -> bool {
        self.state_changed || !self.changed_attributes.is_empty()
    }
}
