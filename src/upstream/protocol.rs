use crate::state::EntitySnapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Message id of the initial `get_states` request
pub const GET_STATES_ID: u64 = 1;
/// Message id of the `state_changed` event subscription
pub const SUBSCRIBE_ID: u64 = 2;

/// Upstream → engine: one step of the inbound stream
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// Connection authenticated; events will follow
    Connected,
    /// Connection lost; no events until the next `Connected`
    Disconnected,
    /// Complete state after (re)connecting
    Resync(Vec<EntitySnapshot>),
    /// Entity state pushed by `state_changed`
    State(EntitySnapshot),
    /// Entity removed upstream (`new_state` is null)
    Removed(String),
}

/// Home Assistant WebSocket server messages the client cares about
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthRequired {
        ha_version: Option<String>,
    },
    AuthOk {
        ha_version: Option<String>,
    },
    AuthInvalid {
        message: Option<String>,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<Value>,
    },
    Event {
        id: u64,
        event: HassEvent,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct HassEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Entity state in Home Assistant's wire format
#[derive(Debug, Deserialize)]
pub struct HassState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl From<HassState> for EntitySnapshot {
    fn from(s: HassState) -> Self {
        Self {
            entity_id: s.entity_id,
            state: s.state,
            attributes: s.attributes,
            last_changed: s.last_changed,
            last_updated: s.last_updated,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StateChangedData {
    entity_id: String,
    new_state: Option<HassState>,
}

pub fn auth_message(token: &str) -> Value {
    json!({ "type": "auth", "access_token": token })
}

pub fn get_states_message() -> Value {
    json!({ "id": GET_STATES_ID, "type": "get_states" })
}

pub fn subscribe_message() -> Value {
    json!({ "id": SUBSCRIBE_ID, "type": "subscribe_events", "event_type": "state_changed" })
}

/// Parse the `get_states` result array into snapshots
pub fn parse_states(result: Value) -> Result<Vec<EntitySnapshot>> {
    let states: Vec<HassState> =
        serde_json::from_value(result).context("Malformed get_states result")?;
    Ok(states.into_iter().map(EntitySnapshot::from).collect())
}

/// Translate a subscribed event into an upstream event.
///
/// Returns `Ok(None)` for event types other than `state_changed`.
pub fn parse_event(event: HassEvent) -> Result<Option<UpstreamEvent>> {
    if event.event_type != "state_changed" {
        return Ok(None);
    }

    let data: StateChangedData =
        serde_json::from_value(event.data).context("Malformed state_changed payload")?;

    Ok(Some(match data.new_state {
        Some(state) => UpstreamEvent::State(state.into()),
        None => UpstreamEvent::Removed(data.entity_id),
    }))
}
