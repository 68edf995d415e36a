// One task per mounted feed. UI events come in through an mpsc queue, the rendered
// state goes out through a watch channel. Loads run on their own tasks so that
// resets and other events are handled while a page is in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Duration, Instant};

use rhythm_core::query::{FeedFilter, SortOrder, TimeWindow, ViewMode};
use rhythm_core::{Error, LengthBucket, Post, PostSource, Result};

use crate::loader::{FeedCapabilities, FeedLoader, LoadResult};

pub const SEARCH_DEBOUNCE_MS: u64 = 250;
pub const EVENT_QUEUE_SIZE: usize = 64;

#[derive(Debug)]
pub enum FeedEvent {
    /// Raw search box content. Applied once typing pauses.
    SearchInput(String),
    SetSort(SortOrder),
    SetWindow(TimeWindow),
    SetLength(Option<LengthBucket>),
    SetTag(Option<String>),
    SetView(ViewMode),
    /// Replace every filter at once.
    SetFilter(FeedFilter),
    LoadMore,
    /// The sentinel at the end of the list scrolled into view.
    SentinelVisible { epoch: u64 },
    SetAutoLoad(bool),
    OpenPost {
        id: String,
        reply: oneshot::Sender<Result<Post>>,
    },
}

/// Everything a view needs to render one feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub capabilities: FeedCapabilities,
    pub filter: FeedFilter,
    pub posts: Vec<Post>,
    pub loading: bool,
    pub has_more: bool,
    pub tags_enabled: bool,
    pub auto_load: bool,
    /// Sentinel signals must carry this epoch; it changes whenever auto-load is toggled.
    pub sentinel_epoch: u64,
    pub generation: u64,
    /// A search is typed but not applied yet.
    pub searching: bool,
    pub message: Option<String>,
    pub status: String,
    pub total: Option<u64>,
    /// Number of events handled so far.
    #[serde(skip)]
    pub processed: u64,
}

pub struct FeedHandle {
    events: mpsc::Sender<FeedEvent>,
    snapshot: watch::Receiver<FeedSnapshot>,
    sent: AtomicU64,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub async fn send(&self, event: FeedEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| Error::Other(anyhow::anyhow!("feed controller stopped")))?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until every event sent so far is handled, no load is running and no search is pending.
    pub async fn settled(&self) -> Result<FeedSnapshot> {
        let sent = self.sent.load(Ordering::SeqCst);
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| s.processed >= sent && !s.loading && !s.searching)
            .await
            .map_err(|_| Error::Other(anyhow::anyhow!("feed controller stopped")))?;
        Ok(snapshot.clone())
    }

    /// Resolve a post through the feed's cache.
    pub async fn open_post(&self, id: &str) -> Result<Post> {
        let (reply, rx) = oneshot::channel();
        self.send(FeedEvent::OpenPost {
            id: id.to_string(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| Error::Other(anyhow::anyhow!("feed controller stopped")))?
    }

    pub fn close(&self) {
        self.task.abort();
    }
}

/// Mount a feed and start loading its first page.
pub fn spawn_feed<S>(source: Arc<S>, caps: FeedCapabilities, filter: FeedFilter, auto_load: bool) -> FeedHandle
where
    S: PostSource + 'static,
{
    let (event_sender, event_receiver) = mpsc::channel(EVENT_QUEUE_SIZE);
    let mut controller = Controller {
        source,
        loader: FeedLoader::new(caps, filter),
        auto_load,
        sentinel_epoch: 0,
        pending_search: None,
        processed: 0,
        in_flight: FuturesUnordered::new(),
        opening: FuturesUnordered::new(),
    };
    controller.start_load("mount");
    let (snapshot_sender, snapshot_receiver) = watch::channel(controller.snapshot());
    let task = task::spawn(controller.run(event_receiver, snapshot_sender));

    FeedHandle {
        events: event_sender,
        snapshot: snapshot_receiver,
        sent: AtomicU64::new(0),
        task,
    }
}

/// A finished single-post fetch, waiting to be cached and answered.
struct Opened {
    generation: u64,
    id: String,
    result: Result<Post>,
    reply: oneshot::Sender<Result<Post>>,
}

struct Controller<S> {
    source: Arc<S>,
    loader: FeedLoader,
    auto_load: bool,
    sentinel_epoch: u64,
    pending_search: Option<(String, Instant)>,
    processed: u64,
    in_flight: FuturesUnordered<BoxFuture<'static, LoadResult>>,
    opening: FuturesUnordered<BoxFuture<'static, Opened>>,
}

impl<S: PostSource + 'static> Controller<S> {
    async fn run(mut self, mut events: mpsc::Receiver<FeedEvent>, snapshot: watch::Sender<FeedSnapshot>) {
        loop {
            let deadline = self.pending_search.as_ref().map(|(_, at)| *at);
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.handle(event);
                    self.processed += 1;
                }
                Some(result) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.loader.apply(result);
                }
                Some(opened) = self.opening.next(), if !self.opening.is_empty() => {
                    self.finish_open(opened);
                }
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some((text, _)) = self.pending_search.take() {
                        let filter = FeedFilter {
                            search: text,
                            ..self.loader.filter().clone()
                        };
                        self.change_filter(filter);
                    }
                }
            }
            snapshot.send_replace(self.snapshot());
        }
        tracing::debug!("Feed {} controller stopped", self.loader.capabilities().kind);
    }

    fn handle(&mut self, event: FeedEvent) {
        let filter = self.loader.filter().clone();
        match event {
            FeedEvent::SearchInput(text) => {
                let at = Instant::now() + Duration::from_millis(SEARCH_DEBOUNCE_MS);
                self.pending_search = Some((text, at));
            }
            FeedEvent::SetSort(sort) => self.change_filter(FeedFilter { sort, ..filter }),
            FeedEvent::SetWindow(window) => self.change_filter(FeedFilter { window, ..filter }),
            FeedEvent::SetLength(length) => self.change_filter(FeedFilter { length, ..filter }),
            FeedEvent::SetTag(tag) => self.change_filter(FeedFilter { tag, ..filter }),
            FeedEvent::SetView(view) => self.change_filter(FeedFilter { view, ..filter }),
            FeedEvent::SetFilter(filter) => self.change_filter(filter),
            FeedEvent::LoadMore => self.start_load("load more"),
            FeedEvent::SentinelVisible { epoch } => {
                if self.auto_load && epoch == self.sentinel_epoch {
                    self.start_load("sentinel");
                } else {
                    tracing::debug!(
                        "Ignored sentinel of epoch {} (current {}, auto load {})",
                        epoch,
                        self.sentinel_epoch,
                        self.auto_load
                    );
                }
            }
            FeedEvent::SetAutoLoad(enabled) => {
                if enabled != self.auto_load {
                    self.auto_load = enabled;
                    self.sentinel_epoch += 1;
                    tracing::info!("Auto load {}", if enabled { "enabled" } else { "disabled" });
                }
            }
            FeedEvent::OpenPost { id, reply } => self.open_post(id, reply),
        }
    }

    /// Answer from the cache, or fetch on a task so other events keep flowing meanwhile.
    fn open_post(&mut self, id: String, reply: oneshot::Sender<Result<Post>>) {
        if let Some(post) = self.loader.cached_post(&id) {
            let _ = reply.send(Ok(post));
            return;
        }

        let generation = self.loader.generation();
        let source = self.source.clone();
        let post_id = id.clone();
        let handle = task::spawn(async move { FeedLoader::fetch_post(source.as_ref(), &post_id).await });
        self.opening.push(Box::pin(async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(Error::Other(anyhow::anyhow!("post task failed: {}", e))),
            };
            Opened {
                generation,
                id,
                result,
                reply,
            }
        }));
    }

    fn finish_open(&mut self, opened: Opened) {
        let Opened {
            generation,
            id,
            result,
            reply,
        } = opened;
        match &result {
            Ok(post) => self.loader.remember(generation, post.clone()),
            Err(e) => tracing::warn!("Cannot open post {}: {}", id, e),
        }
        let _ = reply.send(result);
    }

    fn change_filter(&mut self, filter: FeedFilter) {
        if &filter == self.loader.filter() {
            return;
        }
        self.loader.reset(filter);
        self.start_load("filter change");
    }

    fn start_load(&mut self, trigger: &str) {
        let Some(ticket) = self.loader.begin(Utc::now()) else {
            if self.loader.is_loading() {
                tracing::warn!("Dropped {} trigger, a load is in flight", trigger);
            }
            return;
        };
        tracing::debug!("Load triggered by {} at offset {}", trigger, ticket.query.offset);

        let fallback = ticket.failed("load task aborted");
        let source = self.source.clone();
        let handle = task::spawn(async move { FeedLoader::run(source.as_ref(), ticket).await });
        self.in_flight.push(Box::pin(async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Load task failed: {}", e);
                    fallback
                }
            }
        }));
    }

    fn snapshot(&self) -> FeedSnapshot {
        let loader = &self.loader;
        FeedSnapshot {
            capabilities: loader.capabilities(),
            filter: loader.filter().clone(),
            posts: loader.posts().to_vec(),
            loading: loader.is_loading(),
            has_more: loader.has_more(),
            tags_enabled: loader.tags_enabled(),
            auto_load: self.auto_load,
            sentinel_epoch: self.sentinel_epoch,
            generation: loader.generation(),
            searching: self.pending_search.is_some(),
            message: loader.message().map(str::to_string),
            status: loader.status_line(),
            total: loader.total(),
            processed: self.processed,
        }
    }
}
