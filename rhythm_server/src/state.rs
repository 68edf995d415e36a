use std::sync::Arc;

use rhythm_feed::{engagement::EngagementService, home::HomeFeed, FeedRegistry, RemoteBackend};

#[derive(Clone)]
pub struct AppState {
    /// Anonymous backend, for reads
    pub backend: Arc<RemoteBackend>,

    /// Mounted feeds, closed when idle
    pub feeds: Arc<FeedRegistry>,

    /// Guards toggles in flight across all users
    pub engagement: Arc<EngagementService>,
    /// Landing page cards, picked at most every 30 minutes
    pub home: Arc<HomeFeed<RemoteBackend>>,
}
