// Injectable time source
pub mod clock;

// Error taxonomy
pub mod error;

// Entity snapshots, state cache and change detection
pub mod state;

// Subscriptions, filters, debounce and expiration
pub mod subscription;

// Push delivery to callback sinks
pub mod callback;

// Engine wiring the inbound stream to subscriptions
pub mod engine;

// Home Assistant WebSocket event source
pub mod upstream;

// HTTP and WebSocket tool surface
pub mod api;

// Configuration
pub mod config;
