// Home Assistant WebSocket event source

mod client;
pub mod protocol;

pub use client::{websocket_url, HassEventSource};
pub use protocol::UpstreamEvent;
