// The paginated feed loader behind every listing page.
//
// The backend can filter by kind, text, time and tag, but not by the length of a poem,
// so each logical page may need several remote pages ("backfill") before enough posts
// survive the length filter. A load is split in three steps so that the state is only
// touched synchronously:
//   1. `begin` checks the guards and hands out a ticket for the current generation;
//   2. `run` talks to the backend without touching the loader;
//   3. `apply` commits the result, unless a reset happened in the meantime.

use chrono::{DateTime, Utc};
use serde::Serialize;

use rhythm_core::query::{FeedFilter, PostQuery};
use rhythm_core::{ContentKind, Error, LengthBucket, Post, PostSource, Result};

use crate::cache::PostCache;

/// Posts shown per logical page, after client-side filtering.
pub const PAGE_SIZE: usize = 10;
/// Remote fetches allowed for one logical page.
pub const MAX_FETCHES: usize = 6;

/// What a listing page can filter on. One loader type serves every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeedCapabilities {
    pub kind: ContentKind,
    /// Whether the deployment is expected to evaluate tag containment.
    pub supports_tags: bool,
    /// Whether posts carry a body the length filter can measure.
    pub supports_length_filter: bool,
}

impl FeedCapabilities {
    pub fn for_kind(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Poem => FeedCapabilities {
                kind,
                supports_tags: true,
                supports_length_filter: true,
            },
            ContentKind::Song | ContentKind::Image => FeedCapabilities {
                kind,
                supports_tags: false,
                supports_length_filter: false,
            },
        }
    }
}

/// Handed out by [`FeedLoader::begin`]; carries everything [`FeedLoader::run`] needs.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    pub generation: u64,
    pub query: PostQuery,
    pub length: Option<LengthBucket>,
    pub tags_enabled: bool,
}

impl LoadTicket {
    /// A result that makes no progress, for loads that never got to run.
    pub fn failed(&self, message: &str) -> LoadResult {
        LoadResult {
            generation: self.generation,
            posts: vec![],
            offset: self.query.offset,
            has_more: true,
            fetches: 0,
            total: None,
            tags_rejected: false,
            error: Some(message.to_string()),
        }
    }
}

/// Raw result of [`FeedLoader::run`], not yet applied.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub generation: u64,
    /// At most `PAGE_SIZE` posts that passed the length filter.
    pub posts: Vec<Post>,
    /// Cursor after the last successful fetch.
    pub offset: u64,
    pub has_more: bool,
    pub fetches: usize,
    pub total: Option<u64>,
    /// The backend rejected the tag predicate during this load.
    pub tags_rejected: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Guards refused the trigger: already loading, or nothing left.
    Skipped,
    /// A reset happened while the load was in flight; nothing was applied.
    Stale,
    Loaded { count: usize },
    Failed { message: String },
}

/// Loader state of one mounted feed.
#[derive(Debug, Clone)]
pub struct FeedLoader {
    caps: FeedCapabilities,
    filter: FeedFilter,
    offset: u64,
    has_more: bool,
    loading: bool,
    generation: u64,
    tags_enabled: bool,
    posts: Vec<Post>,
    cache: PostCache,
    message: Option<String>,
    total: Option<u64>,
}

impl FeedLoader {
    pub fn new(caps: FeedCapabilities, filter: FeedFilter) -> Self {
        FeedLoader {
            caps,
            filter,
            offset: 0,
            has_more: true,
            loading: false,
            generation: 0,
            tags_enabled: caps.supports_tags,
            posts: Vec::new(),
            cache: PostCache::new(),
            message: None,
            total: None,
        }
    }

    // MARK: Accessors

    pub fn capabilities(&self) -> FeedCapabilities {
        self.caps
    }

    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tags_enabled(&self) -> bool {
        self.tags_enabled
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn cache(&self) -> &PostCache {
        &self.cache
    }

    /// `Showing 3 poems ("rain", long, newest)`
    pub fn status_line(&self) -> String {
        let parts = self.filter.describe(self.tags_enabled);
        format!(
            "Showing {} {}s ({})",
            self.posts.len(),
            self.caps.kind.as_str(),
            parts.join(", ")
        )
    }

    // MARK: Load cycle

    /// Start over with a new filter. Bumps the generation so in-flight loads get discarded.
    pub fn reset(&mut self, filter: FeedFilter) {
        self.filter = filter;
        self.offset = 0;
        self.has_more = true;
        self.loading = false;
        self.generation += 1;
        self.posts.clear();
        self.cache.clear();
        self.message = None;
        self.total = None;
        tracing::info!("Feed {} reset to generation {}", self.caps.kind, self.generation);
    }

    /// Claim the in-flight slot. `None` if a load is running or the source is exhausted.
    pub fn begin(&mut self, now: DateTime<Utc>) -> Option<LoadTicket> {
        if self.loading || !self.has_more {
            return None;
        }
        self.loading = true;

        let length = self.filter.length.filter(|_| self.caps.supports_length_filter);
        let query = PostQuery::build(
            self.caps.kind,
            &self.filter,
            self.tags_enabled,
            now,
            self.offset,
            PAGE_SIZE as u64,
        );
        Some(LoadTicket {
            generation: self.generation,
            query,
            length,
            tags_enabled: self.tags_enabled,
        })
    }

    /// Fetch remote pages until a full page survives the length filter,
    /// the source runs out, or `MAX_FETCHES` requests were made.
    pub async fn run<S: PostSource + ?Sized>(source: &S, ticket: LoadTicket) -> LoadResult {
        let LoadTicket {
            generation,
            query,
            length,
            mut tags_enabled,
        } = ticket;
        let mut result = LoadResult {
            generation,
            posts: Vec::new(),
            offset: query.offset,
            has_more: true,
            fetches: 0,
            total: None,
            tags_rejected: false,
            error: None,
        };

        while result.fetches < MAX_FETCHES {
            let request = if tags_enabled {
                query.at(result.offset)
            } else {
                query.at(result.offset).without_tag()
            };
            result.fetches += 1;

            let page = match source.fetch_page(&request).await {
                Ok(page) => page,
                Err(e) if tags_enabled && request.has_tag() => {
                    tracing::warn!("Tagged fetch failed, retrying without the tag: {}", e);
                    result.fetches += 1;
                    match source.fetch_page(&request.without_tag()).await {
                        // Only the tag predicate was at fault
                        Ok(page) => {
                            tags_enabled = false;
                            result.tags_rejected = true;
                            page
                        }
                        Err(e) => {
                            result.error = Some(e.to_string());
                            break;
                        }
                    }
                }
                Err(e) => {
                    result.error = Some(e.to_string());
                    break;
                }
            };

            let returned = page.posts.len();
            result.offset += returned as u64;
            result.total = page.total.or(result.total);
            if returned < query.limit as usize {
                result.has_more = false;
            }
            result.posts.extend(
                page.posts
                    .into_iter()
                    .filter(|post| length.map_or(true, |bucket| post.length_bucket() == bucket)),
            );

            if result.posts.len() >= PAGE_SIZE || !result.has_more {
                break;
            }
        }

        // Surplus survivors are dropped, not carried over to the next page.
        result.posts.truncate(PAGE_SIZE);
        result
    }

    /// Commit a finished load, unless it belongs to an older generation.
    pub fn apply(&mut self, result: LoadResult) -> LoadOutcome {
        // The deployment's abilities don't depend on the generation.
        if result.tags_rejected && self.tags_enabled {
            tracing::warn!("Tag filtering disabled for the rest of the session");
            self.tags_enabled = false;
        }

        if result.generation != self.generation {
            tracing::debug!(
                "Discarded stale load of generation {} (current {})",
                result.generation,
                self.generation
            );
            return LoadOutcome::Stale;
        }

        self.loading = false;
        self.offset = result.offset;
        self.has_more = result.has_more;
        self.total = result.total.or(self.total);
        self.cache.extend(result.posts.iter());
        let count = result.posts.len();
        self.posts.extend(result.posts);

        if let Some(error) = result.error {
            tracing::error!("Feed {} load failed at offset {}: {}", self.caps.kind, self.offset, error);
            let message = format!("Error: {}", error);
            self.message = Some(message.clone());
            return LoadOutcome::Failed { message };
        }

        self.message = if self.posts.is_empty() && !self.has_more {
            Some(self.empty_message())
        } else {
            None
        };
        tracing::info!(
            "Feed {} loaded {} posts in {} fetches, offset {}, has more: {}",
            self.caps.kind,
            count,
            result.fetches,
            self.offset,
            self.has_more
        );
        LoadOutcome::Loaded { count }
    }

    /// `begin`, `run` and `apply` in one go, for callers that own the loader across the await.
    pub async fn load_more<S: PostSource + ?Sized>(&mut self, source: &S) -> LoadOutcome {
        match self.begin(Utc::now()) {
            Some(ticket) => {
                let result = Self::run(source, ticket).await;
                self.apply(result)
            }
            None => LoadOutcome::Skipped,
        }
    }

    fn empty_message(&self) -> String {
        let filtered = self.filter.search_text().is_some()
            || self.filter.window != Default::default()
            || self.filter.length.is_some()
            || (self.tags_enabled && self.filter.tag.is_some());
        if filtered {
            format!("No {}s match these filters.", self.caps.kind)
        } else {
            format!("No approved {}s yet.", self.caps.kind)
        }
    }

    // MARK: Single post

    /// The cached post, if it holds the full text needed for a detail view.
    pub fn cached_post(&self, id: &str) -> Option<Post> {
        self.cache.get(id).filter(|p| p.has_body()).cloned()
    }

    /// Cache a post fetched while `generation` was current. Posts fetched before a reset are dropped.
    pub fn remember(&mut self, generation: u64, post: Post) {
        if generation == self.generation {
            self.cache.insert(post);
        }
    }

    /// Fetch a post for the detail view, bypassing the cache.
    pub async fn fetch_post<S: PostSource + ?Sized>(source: &S, id: &str) -> Result<Post> {
        source
            .fetch_post(id)
            .await?
            .ok_or_else(|| Error::ObjectNotFound(format!("post {}", id)))
    }

    /// Resolve a post for the detail view, from the cache when it holds the full text.
    /// Errors leave the loader untouched.
    pub async fn open_post<S: PostSource + ?Sized>(&mut self, source: &S, id: &str) -> Result<Post> {
        if let Some(post) = self.cached_post(id) {
            return Ok(post);
        }

        let generation = self.generation;
        let post = Self::fetch_post(source, id).await?;
        self.remember(generation, post.clone());
        Ok(post)
    }
}
