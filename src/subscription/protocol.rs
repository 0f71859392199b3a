use crate::state::ChangeEvent;
use crate::subscription::Filter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller → Server: create a subscription
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub callback_id: Option<String>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

/// Server → Caller: subscription created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub subscription_id: String,
}

/// Server → Caller: result of unsubscribe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub removed: bool,
}

/// Caller → Server: pull recent changes.
///
/// Without `subscription_id` the global recent-changes window is queried.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentChangesRequest {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub entity_ids: Option<Vec<String>>,
    #[serde(default)]
    pub include_unchanged: bool,
}

/// Public view of a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub subscription_id: String,
    pub entity_ids: Vec<String>,
    pub filter: Filter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Server → Client: change delivered to a callback
#[derive(Debug, Clone, Serialize)]
pub struct ChangeNotification {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(rename = "callbackId")]
    pub callback_id: String,
    pub change: ChangeEvent,
}

impl ChangeNotification {
    pub fn new(callback_id: &str, change: ChangeEvent) -> Self {
        Self {
            msg_type: "change".to_string(),
            callback_id: callback_id.to_string(),
            change,
        }
    }
}

/// Server → Client: notifications were dropped because the client lagged
#[derive(Debug, Clone, Serialize)]
pub struct LaggedMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub skipped: u64,
}

impl LaggedMessage {
    pub fn new(skipped: u64) -> Self {
        Self {
            msg_type: "lagged".to_string(),
            skipped,
        }
    }
}
