use crate::callback::CallbackDispatcher;
use crate::error::{Result, WatchError};
use crate::state::{ChangeEvent, StateCache};
use crate::subscription::debounce::DebounceTracker;
use crate::subscription::filter::Filter;
use crate::subscription::protocol::SubscriptionSummary;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One admitted change with its position in the subscription's log
#[derive(Debug, Clone)]
struct LoggedChange {
    seq: u64,
    event: ChangeEvent,
}

/// Mutable per-subscription state. Holding its lock serializes filter,
/// debounce, log append and callback hand-off for that subscription.
#[derive(Debug)]
struct SubscriptionState {
    debounce: DebounceTracker,
    log: VecDeque<LoggedChange>,
    next_seq: u64,
    last_checked: u64,
    active: bool,
}

/// A registered interest in a fixed set of entities
#[derive(Debug)]
pub struct Subscription {
    pub id: String,
    pub entity_ids: BTreeSet<String>,
    pub filter: Filter,
    pub callback_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    log_capacity: usize,
    state: Mutex<SubscriptionState>,
}

impl Subscription {
    pub fn summary(&self) -> SubscriptionSummary {
        SubscriptionSummary {
            subscription_id: self.id.clone(),
            entity_ids: self.entity_ids.iter().cloned().collect(),
            filter: self.filter.clone(),
            callback_id: self.callback_id.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |deadline| deadline <= now)
    }

    /// Number of changes currently retained in the log
    pub fn log_len(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Run one event through filter and debounce; on admission append it to
    /// the log and hand it to the callback dispatcher.
    fn offer(&self, event: &ChangeEvent, callbacks: &CallbackDispatcher) -> bool {
        let mut state = self.state.lock();

        if !state.active {
            return false;
        }
        if !self.filter.matches(event) {
            return false;
        }
        if !state
            .debounce
            .admit(&event.entity_id, event.detected_at, self.filter.min_age_ms())
        {
            debug!(subscription_id = %self.id, entity_id = %event.entity_id, "Change debounced");
            return false;
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        if state.log.len() >= self.log_capacity {
            state.log.pop_front();
        }
        state.log.push_back(LoggedChange {
            seq,
            event: event.clone(),
        });

        if let Some(callback_id) = &self.callback_id {
            if let Err(e) = callbacks.deliver(callback_id, event.clone()) {
                warn!(subscription_id = %self.id, error = %e, "Dropped callback delivery");
            }
        }

        true
    }

    /// Changes logged since the last call; advances the cursor
    fn take_since_last_checked(&self) -> Vec<ChangeEvent> {
        let mut state = self.state.lock();
        let cursor = state.last_checked;
        let changes = state
            .log
            .iter()
            .filter(|c| c.seq > cursor)
            .map(|c| c.event.clone())
            .collect();
        state.last_checked = state.next_seq;
        changes
    }

    fn deactivate(&self) {
        self.state.lock().active = false;
    }
}

#[derive(Default)]
struct RegistryInner {
    subscriptions: HashMap<String, Arc<Subscription>>,
    /// entity id -> ids of subscriptions watching it
    by_entity: HashMap<String, HashSet<String>>,
}

impl RegistryInner {
    fn remove(&mut self, subscription_id: &str) -> Option<Arc<Subscription>> {
        let sub = self.subscriptions.remove(subscription_id)?;
        for entity_id in &sub.entity_ids {
            if let Some(ids) = self.by_entity.get_mut(entity_id) {
                ids.remove(subscription_id);
                if ids.is_empty() {
                    self.by_entity.remove(entity_id);
                }
            }
        }
        Some(sub)
    }
}

/// Owns the set of active subscriptions and the entity index
pub struct SubscriptionRegistry {
    inner: RwLock<RegistryInner>,
    callbacks: Arc<CallbackDispatcher>,
    log_capacity: usize,
}

impl SubscriptionRegistry {
    pub fn new(callbacks: Arc<CallbackDispatcher>, log_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            callbacks,
            log_capacity: log_capacity.max(1),
        }
    }

    /// Create a subscription over a non-empty set of entities
    pub fn subscribe(
        &self,
        entity_ids: &[String],
        filter: Filter,
        callback_id: Option<String>,
        ttl_seconds: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if entity_ids.is_empty() {
            return Err(WatchError::InvalidArgument(
                "entityIds must contain at least one entity".to_string(),
            ));
        }
        if let Some(blank) = entity_ids.iter().find(|id| id.trim().is_empty()) {
            return Err(WatchError::InvalidArgument(format!(
                "invalid entity id '{}'",
                blank
            )));
        }
        let expires_at = match ttl_seconds {
            Some(0) => {
                return Err(WatchError::InvalidArgument(
                    "ttlSeconds must be positive".to_string(),
                ))
            }
            Some(ttl) => {
                let deadline = i64::try_from(ttl)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .and_then(|delta| now.checked_add_signed(delta))
                    .ok_or_else(|| {
                        WatchError::InvalidArgument(format!("ttlSeconds {} out of range", ttl))
                    })?;
                Some(deadline)
            }
            None => None,
        };
        if callback_id.as_deref().map_or(false, |id| id.trim().is_empty()) {
            return Err(WatchError::InvalidArgument(
                "callbackId must not be blank".to_string(),
            ));
        }

        let id = Uuid::now_v7().to_string();
        let subscription = Arc::new(Subscription {
            id: id.clone(),
            entity_ids: entity_ids.iter().cloned().collect(),
            filter,
            callback_id,
            created_at: now,
            expires_at,
            log_capacity: self.log_capacity,
            state: Mutex::new(SubscriptionState {
                debounce: DebounceTracker::new(),
                log: VecDeque::new(),
                next_seq: 0,
                last_checked: 0,
                active: true,
            }),
        });

        {
            let mut inner = self.inner.write();
            for entity_id in &subscription.entity_ids {
                inner
                    .by_entity
                    .entry(entity_id.clone())
                    .or_default()
                    .insert(id.clone());
            }
            inner.subscriptions.insert(id.clone(), Arc::clone(&subscription));
        }

        info!(
            subscription_id = %id,
            entities = subscription.entity_ids.len(),
            expires_at = ?subscription.expires_at,
            "Subscription created"
        );

        Ok(id)
    }

    /// Remove a subscription. Once this returns, no later dispatch reaches it.
    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        let removed = self.inner.write().remove(subscription_id);

        match removed {
            Some(sub) => {
                sub.deactivate();
                info!(subscription_id = %subscription_id, "Subscription removed");
                true
            }
            None => false,
        }
    }

    /// Remove `subscription_id` only if its deadline has passed at `now`.
    ///
    /// The deadline is re-read under the write lock, so an entry that no
    /// longer exists or is no longer expired is left alone.
    pub fn remove_if_expired(&self, subscription_id: &str, now: DateTime<Utc>) -> bool {
        let removed = {
            let mut inner = self.inner.write();
            let expired = inner
                .subscriptions
                .get(subscription_id)
                .map_or(false, |sub| sub.is_expired(now));
            if expired {
                inner.remove(subscription_id)
            } else {
                None
            }
        };

        match removed {
            Some(sub) => {
                sub.deactivate();
                info!(
                    subscription_id = %subscription_id,
                    expires_at = ?sub.expires_at,
                    "Subscription expired"
                );
                true
            }
            None => false,
        }
    }

    /// Ids and deadlines of subscriptions that carry an expiration
    pub fn expiration_candidates(&self) -> Vec<(String, DateTime<Utc>)> {
        self.inner
            .read()
            .subscriptions
            .values()
            .filter_map(|sub| sub.expires_at.map(|deadline| (sub.id.clone(), deadline)))
            .collect()
    }

    /// Offer `event` to every subscription watching `entity_id`.
    ///
    /// Returns the number of subscriptions that admitted it.
    pub fn dispatch(&self, entity_id: &str, event: &ChangeEvent) -> usize {
        let targets: Vec<Arc<Subscription>> = {
            let inner = self.inner.read();
            match inner.by_entity.get(entity_id) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| inner.subscriptions.get(id).cloned())
                    .collect(),
                None => return 0,
            }
        };

        targets
            .iter()
            .filter(|sub| sub.offer(event, &self.callbacks))
            .count()
    }

    /// Changes admitted since the previous call for this subscription.
    ///
    /// With `include_unchanged`, entities that produced nothing new but are
    /// present in the cache are reported with their current snapshot.
    pub fn recent_changes(
        &self,
        subscription_id: &str,
        include_unchanged: bool,
        cache: &StateCache,
        now: DateTime<Utc>,
    ) -> Result<Vec<ChangeEvent>> {
        let sub = self
            .get(subscription_id)
            .ok_or_else(|| WatchError::NotFound(subscription_id.to_string()))?;

        let mut changes = sub.take_since_last_checked();

        if include_unchanged {
            let reported: HashSet<String> =
                changes.iter().map(|c| c.entity_id.clone()).collect();
            changes.extend(
                sub.entity_ids
                    .iter()
                    .filter(|id| !reported.contains(*id))
                    .filter_map(|id| cache.get(id))
                    .map(|snapshot| ChangeEvent::unchanged(snapshot, now)),
            );
        }

        Ok(changes)
    }

    pub fn get(&self, subscription_id: &str) -> Option<Arc<Subscription>> {
        self.inner.read().subscriptions.get(subscription_id).cloned()
    }

    /// Summaries of all active subscriptions, oldest first
    pub fn list(&self) -> Vec<SubscriptionSummary> {
        let mut summaries: Vec<SubscriptionSummary> = self
            .inner
            .read()
            .subscriptions
            .values()
            .map(|sub| sub.summary())
            .collect();
        summaries.sort_by(|a, b| a.subscription_id.cmp(&b.subscription_id));
        summaries
    }

    /// Ids of subscriptions currently watching `entity_id`
    pub fn watchers(&self, entity_id: &str) -> Vec<String> {
        self.inner
            .read()
            .by_entity
            .get(entity_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
