use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Per-entity minimum-interval gate for one subscription.
///
/// Entries are only created for entities that were admitted with a non-zero
/// window, so filters without debounce keep no state here.
#[derive(Debug, Default)]
pub struct DebounceTracker {
    last_notified: HashMap<String, DateTime<Utc>>,
}

impl DebounceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a notification for `entity_id` at `now` if at least `min_age_ms`
    /// has passed since the last admitted one.
    pub fn admit(&mut self, entity_id: &str, now: DateTime<Utc>, min_age_ms: Option<u64>) -> bool {
        let min_age = match min_age_ms {
            Some(ms) if ms > 0 => Duration::milliseconds(ms.min(i64::MAX as u64) as i64),
            _ => return true,
        };

        match self.last_notified.get_mut(entity_id) {
            Some(last) => {
                if now - *last >= min_age {
                    *last = now;
                    true
                } else {
                    false
                }
            }
            None => {
                self.last_notified.insert(entity_id.to_string(), now);
                true
            }
        }
    }

    pub fn last_notified(&self, entity_id: &str) -> Option<DateTime<Utc>> {
        self.last_notified.get(entity_id).copied()
    }

    pub fn len(&self) -> usize {
        self.last_notified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_notified.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_no_window_admits_without_recording() {
        let mut tracker = DebounceTracker::new();
        assert!(tracker.admit("light.kitchen", at_ms(0), None));
        assert!(tracker.admit("light.kitchen", at_ms(1), Some(0)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_window_suppresses_then_admits() {
        let mut tracker = DebounceTracker::new();

        assert!(tracker.admit("light.kitchen", at_ms(0), Some(1000)));
        assert!(!tracker.admit("light.kitchen", at_ms(200), Some(1000)));
        assert!(tracker.admit("light.kitchen", at_ms(1200), Some(1000)));

        assert_eq!(tracker.last_notified("light.kitchen"), Some(at_ms(1200)));
    }

    #[test]
    fn test_rejection_does_not_move_timestamp() {
        let mut tracker = DebounceTracker::new();

        assert!(tracker.admit("sensor.temp", at_ms(0), Some(1000)));
        assert!(!tracker.admit("sensor.temp", at_ms(900), Some(1000)));
        // Measured from the admitted notification, not the rejected one
        assert!(tracker.admit("sensor.temp", at_ms(1000), Some(1000)));
    }

    #[test]
    fn test_entities_tracked_independently() {
        let mut tracker = DebounceTracker::new();

        assert!(tracker.admit("a", at_ms(0), Some(1000)));
        assert!(tracker.admit("b", at_ms(100), Some(1000)));
        assert!(!tracker.admit("a", at_ms(100), Some(1000)));
        assert_eq!(tracker.len(), 2);
    }
}
