use crate::state::ChangeEvent;
use serde::{Deserialize, Serialize};

/// Subscription filter. All fields optional; an empty filter passes every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// Require the state value to change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_change: Option<bool>,

    /// Require the change to touch at least one of these attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_changes: Option<Vec<String>>,

    /// Minimum milliseconds between notifications per entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_state_change_age: Option<u64>,
}

impl Filter {
    pub fn state_change() -> Self {
        Self {
            state_change: Some(true),
            ..Default::default()
        }
    }

    pub fn attributes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attribute_changes: Some(names.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn with_min_age_ms(mut self, ms: u64) -> Self {
        self.min_state_change_age = Some(ms);
        self
    }

    /// Debounce window, if any
    pub fn min_age_ms(&self) -> Option<u64> {
        self.min_state_change_age.filter(|ms| *ms > 0)
    }

    /// Both conditions, when set, must pass independently.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if self.state_change == Some(true) && !event.state_changed {
            return false;
        }

        if let Some(names) = self.attribute_changes.as_deref() {
            if !names.is_empty()
                && !names
                    .iter()
                    .any(|name| event.changed_attributes.contains(name))
            {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntitySnapshot;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn event(state_changed: bool, attrs: &[&str]) -> ChangeEvent {
        let now = Utc::now();
        ChangeEvent {
            entity_id: "light.kitchen".to_string(),
            previous: None,
            current: Arc::new(EntitySnapshot::new("light.kitchen", "on", now)),
            changed_attributes: attrs.iter().map(|a| a.to_string()).collect::<BTreeSet<_>>(),
            state_changed,
            detected_at: now,
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::default();
        assert!(filter.matches(&event(false, &[])));
        assert!(filter.matches(&event(true, &["brightness"])));
    }

    #[test]
    fn test_state_change_filter_rejects_attribute_only_change() {
        let filter = Filter::state_change();
        assert!(!filter.matches(&event(false, &["brightness"])));
        assert!(filter.matches(&event(true, &[])));
    }

    #[test]
    fn test_state_change_false_does_not_filter() {
        let filter = Filter {
            state_change: Some(false),
            ..Default::default()
        };
        assert!(filter.matches(&event(false, &[])));
    }

    #[test]
    fn test_attribute_filter_requires_intersection() {
        let filter = Filter::attributes(["unit", "precision"]);
        assert!(!filter.matches(&event(true, &["brightness"])));
        assert!(filter.matches(&event(false, &["unit"])));
    }

    #[test]
    fn test_empty_attribute_list_does_not_filter() {
        let filter = Filter::attributes(Vec::<String>::new());
        assert!(filter.matches(&event(false, &[])));
    }

    #[test]
    fn test_combined_filter_is_logical_and() {
        let filter = Filter {
            state_change: Some(true),
            attribute_changes: Some(vec!["brightness".to_string()]),
            min_state_change_age: None,
        };

        assert!(!filter.matches(&event(true, &["color"])));
        assert!(!filter.matches(&event(false, &["brightness"])));
        assert!(filter.matches(&event(true, &["brightness", "color"])));
    }

    #[test]
    fn test_filter_deserializes_camel_case() {
        let filter: Filter = serde_json::from_str(
            r#"{"stateChange": true, "attributeChanges": ["unit"], "minStateChangeAge": 1000}"#,
        )
        .unwrap();

        assert_eq!(filter.state_change, Some(true));
        assert_eq!(filter.attribute_changes, Some(vec!["unit".to_string()]));
        assert_eq!(filter.min_age_ms(), Some(1000));
    }
}
