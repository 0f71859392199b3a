use crate::callback::{CallbackDispatcher, CallbackSink};
use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::error::{Result, WatchError};
use crate::state::{ChangeDetector, ChangeEvent, EntitySnapshot, StateCache};
use crate::subscription::{ExpirationSweeper, Filter, SubscriptionRegistry, SubscriptionSummary};
use crate::upstream::UpstreamEvent;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Entity-state subscription engine.
///
/// All inbound snapshots pass through `ingest` one at a time: change
/// detection and the cache swap happen there, then the event fans out to
/// the subscriptions watching that entity. Each engine owns its own cache,
/// registry and callbacks; nothing is process-global.
pub struct WatchEngine {
    cache: Arc<StateCache>,
    detector: ChangeDetector,
    registry: Arc<SubscriptionRegistry>,
    callbacks: Arc<CallbackDispatcher>,
    clock: SharedClock,
    config: EngineConfig,

    /// Global recent-changes view, oldest first
    recent: Mutex<VecDeque<ChangeEvent>>,

    /// False while the upstream source is disconnected (degraded mode)
    upstream_available: AtomicBool,

    /// Inbound snapshots processed (lifetime counter)
    events_processed: AtomicU64,
}

impl WatchEngine {
    pub fn new(config: EngineConfig, clock: SharedClock) -> Self {
        let cache = Arc::new(StateCache::new());
        let callbacks = Arc::new(CallbackDispatcher::new(
            config.callback_queue_capacity,
            config.delivery_timeout(),
        ));
        let registry = Arc::new(SubscriptionRegistry::new(
            Arc::clone(&callbacks),
            config.change_log_capacity,
        ));

        Self {
            detector: ChangeDetector::new(Arc::clone(&cache)),
            cache,
            registry,
            callbacks,
            clock,
            config,
            recent: Mutex::new(VecDeque::new()),
            upstream_available: AtomicBool::new(false),
            events_processed: AtomicU64::new(0),
        }
    }

    /// Process one inbound snapshot: diff, cache swap, fan-out
    pub fn ingest(&self, snapshot: EntitySnapshot) -> ChangeEvent {
        let now = self.clock.now();
        let entity_id = snapshot.entity_id.clone();
        let event = self.detector.detect(&entity_id, snapshot, now);
        self.events_processed.fetch_add(1, Ordering::Relaxed);

        if event.is_change() {
            self.record_recent(&event);
        }

        let admitted = self.registry.dispatch(&entity_id, &event);
        debug!(
            entity_id = %entity_id,
            state_changed = event.state_changed,
            changed_attributes = event.changed_attributes.len(),
            admitted = admitted,
            "Processed state update"
        );

        event
    }

    /// Treat `snapshots` as the complete upstream state.
    ///
    /// Each snapshot is diffed against the cache as usual; entities missing
    /// from the resync are dropped from the cache.
    pub fn resync(&self, snapshots: Vec<EntitySnapshot>) {
        let keep: HashSet<String> = snapshots.iter().map(|s| s.entity_id.clone()).collect();
        let total = snapshots.len();

        for snapshot in snapshots {
            self.ingest(snapshot);
        }
        let dropped = self.cache.retain_ids(&keep);

        info!(entities = total, dropped = dropped, "State resync applied");
    }

    /// Entity deleted upstream
    pub fn remove_entity(&self, entity_id: &str) {
        if self.cache.remove(entity_id).is_some() {
            info!(entity_id = %entity_id, "Entity removed");
        }
    }

    /// Apply one upstream event
    pub fn handle_upstream(&self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::Connected => {
                self.upstream_available.store(true, Ordering::SeqCst);
                info!("Upstream available");
            }
            UpstreamEvent::Disconnected => {
                self.upstream_available.store(false, Ordering::SeqCst);
                warn!("Upstream unavailable, serving last-known state");
            }
            UpstreamEvent::Resync(snapshots) => self.resync(snapshots),
            UpstreamEvent::State(snapshot) => {
                self.ingest(snapshot);
            }
            UpstreamEvent::Removed(entity_id) => self.remove_entity(&entity_id),
        }
    }

    /// Drain the inbound stream in arrival order until it closes or `cancel` fires
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<UpstreamEvent>, cancel: CancellationToken) {
        info!("Starting engine inbound loop");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(event) => self.handle_upstream(event),
                    None => {
                        warn!("Upstream channel closed");
                        break;
                    }
                },
            }
        }

        self.upstream_available.store(false, Ordering::SeqCst);
        info!("Engine inbound loop stopped");
    }

    /// Sweeper bound to this engine's registry and clock
    pub fn sweeper(&self) -> ExpirationSweeper {
        ExpirationSweeper::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.clock),
            self.config.sweep_interval(),
        )
    }

    pub fn subscribe(
        &self,
        entity_ids: &[String],
        filter: Filter,
        callback_id: Option<String>,
        ttl_seconds: Option<u64>,
    ) -> Result<String> {
        self.registry
            .subscribe(entity_ids, filter, callback_id, ttl_seconds, self.clock.now())
    }

    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.registry.unsubscribe(subscription_id)
    }

    /// Pull recent changes.
    ///
    /// With a subscription id this returns that subscription's changes since
    /// its last query. Without one it returns the global view bounded by the
    /// recency window. `entity_ids` narrows either result.
    pub fn recent_changes(
        &self,
        subscription_id: Option<&str>,
        entity_ids: Option<&[String]>,
        include_unchanged: bool,
    ) -> Result<Vec<ChangeEvent>> {
        let now = self.clock.now();
        let wanted: Option<HashSet<&str>> =
            entity_ids.map(|ids| ids.iter().map(String::as_str).collect());
        let is_wanted = |id: &str| wanted.as_ref().map_or(true, |w| w.contains(id));

        let changes: Vec<ChangeEvent> = match subscription_id {
            Some(id) => self
                .registry
                .recent_changes(id, include_unchanged, &self.cache, now)?
                .into_iter()
                .filter(|c| is_wanted(&c.entity_id))
                .collect(),
            None => {
                let cutoff = self.recent_cutoff(now);
                let mut changes: Vec<ChangeEvent> = self
                    .recent
                    .lock()
                    .iter()
                    .filter(|c| {
                        cutoff.map_or(true, |cutoff| c.detected_at >= cutoff)
                            && is_wanted(&c.entity_id)
                    })
                    .cloned()
                    .collect();

                if include_unchanged {
                    let reported: HashSet<String> =
                        changes.iter().map(|c| c.entity_id.clone()).collect();
                    let candidates: Vec<Arc<EntitySnapshot>> = match entity_ids {
                        Some(ids) => ids.iter().filter_map(|id| self.cache.get(id)).collect(),
                        None => self.cache.all(),
                    };
                    changes.extend(
                        candidates
                            .into_iter()
                            .filter(|s| !reported.contains(&s.entity_id))
                            .map(|s| ChangeEvent::unchanged(s, now)),
                    );
                }
                changes
            }
        };

        Ok(changes)
    }

    pub fn list_subscriptions(&self) -> Vec<SubscriptionSummary> {
        self.registry.list()
    }

    pub fn register_callback(&self, callback_id: &str, sink: Arc<dyn CallbackSink>) -> Result<bool> {
        if callback_id.trim().is_empty() {
            return Err(WatchError::InvalidArgument(
                "callbackId must not be blank".to_string(),
            ));
        }
        Ok(self.callbacks.register(callback_id, sink))
    }

    pub fn unregister_callback(&self, callback_id: &str) -> bool {
        self.callbacks.unregister(callback_id)
    }

    /// Current cached snapshot of an entity
    pub fn entity(&self, entity_id: &str) -> Option<Arc<EntitySnapshot>> {
        self.cache.get(entity_id)
    }

    pub fn entity_count(&self) -> usize {
        self.cache.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    pub fn upstream_available(&self) -> bool {
        self.upstream_available.load(Ordering::SeqCst)
    }

    /// `UpstreamUnavailable` while the event source is disconnected
    pub fn ensure_upstream(&self) -> Result<()> {
        if self.upstream_available() {
            Ok(())
        } else {
            Err(WatchError::UpstreamUnavailable)
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Oldest detection time still inside the recency window.
    ///
    /// `None` when the window reaches past the representable range, in which
    /// case nothing is old enough to drop.
    fn recent_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        i64::try_from(self.config.recent_window_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|window| now.checked_sub_signed(window))
    }

    fn record_recent(&self, event: &ChangeEvent) {
        let cutoff = self.recent_cutoff(event.detected_at);
        let capacity = self.config.recent_buffer_capacity.max(1);
        let mut recent = self.recent.lock();

        while recent.front().map_or(false, |c| {
            cutoff.map_or(false, |cutoff| c.detected_at < cutoff) || recent.len() >= capacity
        }) {
            recent.pop_front();
        }
        recent.push_back(event.clone());
    }
}
