pub mod api;
mod cache;
pub mod controller;
pub mod engagement;
pub mod home;
pub mod loader;
pub mod profile;
pub mod registry;
pub mod search;
pub mod submission;
pub mod user;

#[cfg(test)]
mod fake;

pub use api::RemoteBackend;
pub use cache::*;
pub use controller::{spawn_feed, FeedEvent, FeedHandle, FeedSnapshot};
pub use loader::{FeedCapabilities, FeedLoader, LoadOutcome, MAX_FETCHES, PAGE_SIZE};
pub use registry::FeedRegistry;
