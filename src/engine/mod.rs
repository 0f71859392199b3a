// Engine wiring the inbound stream to subscriptions

mod watch;

pub use watch::WatchEngine;
