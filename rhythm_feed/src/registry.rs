// Feeds mounted through the HTTP surface. Clients rarely say goodbye, so feeds that
// weren't touched for `FEED_IDLE_TTL` are closed by a periodic sweep, and the least
// recently used one makes room when the registry is full.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Duration, Instant};

use crate::controller::FeedHandle;

pub const FEED_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
pub const MAX_FEEDS: usize = 1024;
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Mounted {
    handle: Arc<FeedHandle>,
    last_access: Instant,
}

pub struct FeedRegistry {
    feeds: RwLock<HashMap<u64, Mounted>>,
    next_id: AtomicU64,
    idle_ttl: Duration,
    capacity: usize,
}

impl Default for FeedRegistry {
    fn default() -> Self {
        Self::with_limits(FEED_IDLE_TTL, MAX_FEEDS)
    }
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(idle_ttl: Duration, capacity: usize) -> Self {
        FeedRegistry {
            feeds: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            idle_ttl,
            capacity: capacity.max(1),
        }
    }

    /// Register a mounted feed and return its id. Closes the least recently used feed when full.
    pub async fn insert(&self, handle: FeedHandle) -> (u64, Arc<FeedHandle>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(handle);
        let mut feeds = self.feeds.write().await;

        if feeds.len() >= self.capacity {
            let oldest = feeds
                .iter()
                .min_by_key(|(_, mounted)| mounted.last_access)
                .map(|(id, _)| *id);
            if let Some(mounted) = oldest.and_then(|oldest| feeds.remove_entry(&oldest)) {
                tracing::warn!("Feed registry full, closed least recently used feed {}", mounted.0);
                mounted.1.handle.close();
            }
        }

        feeds.insert(
            id,
            Mounted {
                handle: handle.clone(),
                last_access: Instant::now(),
            },
        );
        (id, handle)
    }

    /// Look up a feed and mark it as used.
    pub async fn get(&self, id: u64) -> Option<Arc<FeedHandle>> {
        let mut feeds = self.feeds.write().await;
        let mounted = feeds.get_mut(&id)?;
        mounted.last_access = Instant::now();
        Some(mounted.handle.clone())
    }

    /// Unregister and close a feed.
    pub async fn remove(&self, id: u64) -> Option<Arc<FeedHandle>> {
        let mounted = self.feeds.write().await.remove(&id)?;
        mounted.handle.close();
        Some(mounted.handle)
    }

    /// Close every feed idle for longer than the TTL. Returns how many were closed.
    pub async fn sweep(&self) -> usize {
        let mut feeds = self.feeds.write().await;
        let before = feeds.len();
        feeds.retain(|id, mounted| {
            let idle = mounted.last_access.elapsed() > self.idle_ttl;
            if idle {
                tracing::info!("Closed idle feed {}", id);
                mounted.handle.close();
            }
            !idle
        });
        before - feeds.len()
    }

    pub async fn len(&self) -> usize {
        self.feeds.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.feeds.read().await.is_empty()
    }

    /// Sweep every `SWEEP_INTERVAL` for as long as the registry lives.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        task::spawn(async move {
            let mut interval = time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let closed = self.sweep().await;
                if closed > 0 {
                    tracing::debug!("Swept {} idle feeds, {} left", closed, self.len().await);
                }
            }
        })
    }
}

#[cfg(test)]
mod test {
    use rhythm_core::query::FeedFilter;
    use rhythm_core::ContentKind;

    use super::*;
    use crate::controller::FeedEvent;
    use crate::fake::FakeSource;
    use crate::loader::FeedCapabilities;

    fn mount(source: &Arc<FakeSource>) -> FeedHandle {
        let caps = FeedCapabilities::for_kind(ContentKind::Poem);
        crate::controller::spawn_feed(source.clone(), caps, FeedFilter::default(), false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_feeds_are_swept() {
        let source = Arc::new(FakeSource::with_short_poems(5));
        let registry = FeedRegistry::new();
        let (first, _) = registry.insert(mount(&source)).await;
        let (second, _) = registry.insert(mount(&source)).await;
        assert_ne!(first, second);

        time::advance(Duration::from_secs(20 * 60)).await;
        assert!(registry.get(first).await.is_some());
        time::advance(Duration::from_secs(15 * 60)).await;

        assert_eq!(registry.sweep().await, 1);
        assert!(registry.get(second).await.is_none());
        assert!(registry.get(first).await.is_some());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_registry_closes_least_recently_used() {
        let source = Arc::new(FakeSource::with_short_poems(5));
        let registry = FeedRegistry::with_limits(FEED_IDLE_TTL, 2);
        let (first, _) = registry.insert(mount(&source)).await;
        time::advance(Duration::from_secs(1)).await;
        let (second, _) = registry.insert(mount(&source)).await;
        time::advance(Duration::from_secs(1)).await;
        registry.get(first).await;

        let (third, _) = registry.insert(mount(&source)).await;
        assert_eq!(registry.len().await, 2);
        assert!(registry.get(second).await.is_none());
        assert!(registry.get(first).await.is_some());
        assert!(registry.get(third).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_feed_is_closed() {
        let source = Arc::new(FakeSource::with_short_poems(5));
        let registry = FeedRegistry::new();
        let (id, handle) = registry.insert(mount(&source)).await;
        handle.settled().await.unwrap();

        assert!(registry.remove(id).await.is_some());
        assert!(registry.remove(id).await.is_none());
        assert!(registry.is_empty().await);
        // The controller is gone, events are refused or never handled
        let refused = handle.send(FeedEvent::LoadMore).await.is_err();
        assert!(refused || handle.settled().await.is_err());
    }
}
