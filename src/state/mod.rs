// Entity state cache and change detection

mod cache;
mod detector;
mod entity;

pub use cache::StateCache;
pub use detector::{diff_attributes, ChangeDetector};
pub use entity::{ChangeEvent, EntitySnapshot};
