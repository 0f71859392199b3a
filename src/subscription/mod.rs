// Entity subscriptions: filtering, debounce, change logs and expiration

mod debounce;
mod filter;
pub mod protocol;
mod registry;
mod sweeper;

pub use debounce::DebounceTracker;
pub use filter::Filter;
pub use protocol::{
    RecentChangesRequest, SubscribeRequest, SubscribeResponse, SubscriptionSummary,
    UnsubscribeResponse,
};
pub use registry::{Subscription, SubscriptionRegistry};
pub use sweeper::ExpirationSweeper;
