// Cards on the landing page: a random mix of recent posts from every section.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use rhythm_core::query::{FeedFilter, PostQuery};
use rhythm_core::{ContentKind, Post, PostSource};

pub const MAX_CARDS: usize = 9;
/// Recent posts considered per section.
pub const POOL_PER_KIND: u64 = 12;
pub const CARDS_TTL: Duration = Duration::from_secs(30 * 60);
const DESC_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomeCard {
    pub section: String,
    pub title: String,
    pub desc: String,
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn page(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Poem => "poetry.html",
        ContentKind::Song => "music.html",
        ContentKind::Image => "art.html",
    }
}

impl HomeCard {
    fn from_post(post: &Post) -> Self {
        let desc = match post.kind {
            ContentKind::Poem => post
                .body
                .as_deref()
                .and_then(|b| b.lines().map(str::trim).find(|l| !l.is_empty()))
                .map(|line| line.chars().take(DESC_MAX_CHARS).collect())
                .unwrap_or_default(),
            ContentKind::Song => post.song_url.clone().unwrap_or_default(),
            ContentKind::Image => String::new(),
        };
        HomeCard {
            section: post.kind.section().to_string(),
            title: post.title.clone(),
            desc,
            href: format!("{}#post-{}", page(post.kind), post.id),
            image: post.image_url.clone(),
        }
    }

    fn featured(kind: ContentKind) -> Self {
        HomeCard {
            section: kind.section().to_string(),
            title: format!("Featured {}", kind.section()),
            desc: format!("New {}s will show up here once approved.", kind),
            href: page(kind).to_string(),
            image: None,
        }
    }
}

pub struct HomeFeed<S> {
    source: Arc<S>,
    picked: Mutex<Option<(Instant, Vec<HomeCard>)>>,
}

impl<S: PostSource> HomeFeed<S> {
    pub fn new(source: Arc<S>) -> Self {
        HomeFeed {
            source,
            picked: Mutex::new(None),
        }
    }

    /// The cards picked within the last `CARDS_TTL`, or a fresh pick.
    pub async fn cards(&self) -> Vec<HomeCard> {
        let mut picked = self.picked.lock().await;
        if let Some((at, cards)) = picked.as_ref() {
            if at.elapsed() < CARDS_TTL {
                return cards.clone();
            }
        }

        let cards = self.pick().await;
        *picked = Some((Instant::now(), cards.clone()));
        cards
    }

    async fn pick(&self) -> Vec<HomeCard> {
        let now = Utc::now();
        let requests = ContentKind::ALL.map(|kind| {
            let query = PostQuery::build(kind, &FeedFilter::default(), false, now, 0, POOL_PER_KIND);
            async move { (kind, self.source.fetch_page(&query).await) }
        });

        let mut pool = Vec::new();
        for (kind, result) in join_all(requests).await {
            match result {
                Ok(page) => pool.extend(page.posts.iter().map(HomeCard::from_post)),
                Err(e) => tracing::warn!("Skipped {} cards: {}", kind.section(), e),
            }
        }

        if pool.is_empty() {
            tracing::info!("No posts for the home page, using featured cards");
            return ContentKind::ALL.map(HomeCard::featured).to_vec();
        }
        let cards = pool
            .choose_multiple(&mut rand::thread_rng(), MAX_CARDS)
            .cloned()
            .collect::<Vec<_>>();
        tracing::info!("Picked {} home cards from {} candidates", cards.len(), pool.len());
        cards
    }
}
