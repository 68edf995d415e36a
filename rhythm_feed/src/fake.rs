// In-memory backend for tests. Counts every call so tests can assert on remote traffic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use rhythm_core::query::PostQuery;
use rhythm_core::social::{Comment, Profile, Reaction};
use rhythm_core::{
    ContentKind, EngagementSource, Error, NewPost, Post, PostChanges, PostId, PostPage, PostSource, PostStatus,
    ProfileSource, Result,
};

pub fn short_body() -> String {
    "a small poem\nabout rain".to_string()
}

pub fn long_body() -> String {
    vec!["x".repeat(60); 20].join("\n")
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn post(index: usize, kind: ContentKind, body: Option<String>) -> Post {
    Post {
        id: index.to_string(),
        kind,
        title: format!("{} {}", kind.section(), index),
        status: PostStatus::Approved,
        body,
        song_url: None,
        image_url: None,
        created_at: base_time() - chrono::Duration::minutes(index as i64),
        tags: vec![],
        user_id: Some("author".to_string()),
    }
}

#[derive(Debug)]
struct ReactionRecord {
    row_id: String,
    reaction: Reaction,
    user_id: String,
    post_id: String,
}

#[derive(Debug, Default)]
struct Store {
    posts: Vec<Post>,
    reject_tags: bool,
    failures: VecDeque<String>,
    page_queries: Vec<PostQuery>,
    post_calls: usize,
    reactions: Vec<ReactionRecord>,
    comments: Vec<(PostId, Comment)>,
    profiles: HashMap<String, Profile>,
    profile_inserts: usize,
    next_id: u64,
}

impl Store {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("row{}", self.next_id)
    }
}

#[derive(Debug, Default)]
pub struct FakeSource {
    store: Mutex<Store>,
    delay: Duration,
}

impl FakeSource {
    pub fn with_posts(posts: Vec<Post>) -> Self {
        FakeSource {
            store: Mutex::new(Store {
                posts,
                ..Default::default()
            }),
            delay: Duration::ZERO,
        }
    }

    pub fn with_bodies(bodies: impl IntoIterator<Item = String>) -> Self {
        let posts = bodies
            .into_iter()
            .enumerate()
            .map(|(i, body)| post(i, ContentKind::Poem, Some(body)))
            .collect();
        Self::with_posts(posts)
    }

    pub fn with_short_poems(count: usize) -> Self {
        Self::with_bodies((0..count).map(|_| short_body()))
    }

    /// Fail any page request carrying a tag predicate, like a deployment without the tags column.
    pub fn reject_tags(self) -> Self {
        self.store.lock().unwrap().reject_tags = true;
        self
    }

    /// Every remote call sleeps this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next page, search or post write with this message. Queued failures are consumed in order.
    pub fn fail_next(&self, message: &str) {
        self.store.lock().unwrap().failures.push_back(message.to_string());
    }

    pub fn add_profile(&self, profile: Profile) {
        self.store.lock().unwrap().profiles.insert(profile.id.clone(), profile);
    }

    pub fn stored_profile(&self, id: &str) -> Option<Profile> {
        self.store.lock().unwrap().profiles.get(id).cloned()
    }

    pub fn profile_inserts(&self) -> usize {
        self.store.lock().unwrap().profile_inserts
    }

    pub fn page_calls(&self) -> usize {
        self.store.lock().unwrap().page_queries.len()
    }

    pub fn page_queries(&self) -> Vec<PostQuery> {
        self.store.lock().unwrap().page_queries.clone()
    }

    pub fn post_calls(&self) -> usize {
        self.store.lock().unwrap().post_calls
    }

    pub fn total_calls(&self) -> usize {
        self.page_calls() + self.post_calls()
    }

    pub fn stored_post(&self, id: &str) -> Option<Post> {
        self.store.lock().unwrap().posts.iter().find(|p| p.id == id).cloned()
    }

    fn take_failure(&self) -> Result<()> {
        match self.store.lock().unwrap().failures.pop_front() {
            Some(message) => Err(Error::Remote(message)),
            None => Ok(()),
        }
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl PostSource for FakeSource {
    async fn fetch_page(&self, query: &PostQuery) -> Result<PostPage> {
        {
            let mut store = self.store.lock().unwrap();
            store.page_queries.push(query.clone());
            if let Some(message) = store.failures.pop_front() {
                return Err(Error::Remote(message));
            }
            if store.reject_tags && query.has_tag() {
                return Err(Error::Remote("column posts.tags does not exist".to_string()));
            }
        }
        self.pause().await;

        let store = self.store.lock().unwrap();
        let matching = store
            .posts
            .iter()
            .filter(|p| p.kind == query.kind && p.status == PostStatus::Approved)
            .filter(|p| query.tag.as_ref().map_or(true, |t| p.tags.contains(t)))
            .collect::<Vec<_>>();
        let posts = matching
            .iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|p| (*p).clone())
            .collect();
        Ok(PostPage {
            posts,
            total: Some(matching.len() as u64),
        })
    }

    async fn fetch_post(&self, id: &str) -> Result<Option<Post>> {
        self.pause().await;
        let mut store = self.store.lock().unwrap();
        store.post_calls += 1;
        Ok(store
            .posts
            .iter()
            .find(|p| p.id == id && p.status == PostStatus::Approved)
            .cloned())
    }

    /// Plain case-insensitive substring match; escapes are not interpreted.
    async fn search_posts(&self, pattern: &str, limit: u64) -> Result<Vec<Post>> {
        self.take_failure()?;
        self.pause().await;
        let pattern = pattern.to_lowercase();
        let store = self.store.lock().unwrap();
        let mut posts = store
            .posts
            .iter()
            .filter(|p| p.status == PostStatus::Approved)
            .filter(|p| {
                p.title.to_lowercase().contains(&pattern)
                    || p.body.as_deref().is_some_and(|b| b.to_lowercase().contains(&pattern))
            })
            .cloned()
            .collect::<Vec<_>>();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts.truncate(limit as usize);
        Ok(posts)
    }

    async fn posts_by_user(&self, user_id: &str, status: Option<PostStatus>) -> Result<Vec<Post>> {
        self.take_failure()?;
        let store = self.store.lock().unwrap();
        let mut posts = store
            .posts
            .iter()
            .filter(|p| p.user_id.as_deref() == Some(user_id))
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect::<Vec<_>>();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn fetch_own_post(&self, id: &str, user_id: &str) -> Result<Option<Post>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .posts
            .iter()
            .find(|p| p.id == id && p.user_id.as_deref() == Some(user_id))
            .cloned())
    }

    async fn insert_post(&self, user_id: &str, post: &NewPost) -> Result<Post> {
        self.take_failure()?;
        let mut store = self.store.lock().unwrap();
        store.next_id += 1;
        let post = Post {
            id: format!("new{}", store.next_id),
            kind: post.kind,
            title: post.title.clone(),
            status: PostStatus::Pending,
            body: post.body.clone(),
            song_url: post.song_url.clone(),
            image_url: post.image_url.clone(),
            created_at: base_time() + chrono::Duration::minutes(store.next_id as i64),
            tags: vec![],
            user_id: Some(user_id.to_string()),
        };
        store.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: &str, user_id: &str, changes: &PostChanges) -> Result<Post> {
        self.take_failure()?;
        let mut store = self.store.lock().unwrap();
        let post = store
            .posts
            .iter_mut()
            .find(|p| p.id == id && p.user_id.as_deref() == Some(user_id))
            .ok_or_else(|| Error::ObjectNotFound(format!("post {}", id)))?;
        if let Some(title) = &changes.title {
            post.title = title.clone();
        }
        if let Some(body) = &changes.body {
            post.body = Some(body.clone());
        }
        if let Some(song_url) = &changes.song_url {
            post.song_url = Some(song_url.clone());
        }
        if let Some(image_url) = &changes.image_url {
            post.image_url = Some(image_url.clone());
        }
        if let Some(status) = changes.status {
            post.status = status;
        }
        Ok(post.clone())
    }

    async fn delete_post(&self, id: &str, user_id: &str) -> Result<()> {
        self.take_failure()?;
        let mut store = self.store.lock().unwrap();
        let before = store.posts.len();
        store
            .posts
            .retain(|p| !(p.id == id && p.user_id.as_deref() == Some(user_id)));
        if store.posts.len() == before {
            return Err(Error::ObjectNotFound(format!("post {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl EngagementSource for FakeSource {
    async fn reaction_counts(&self, reaction: Reaction, post_ids: &[PostId]) -> Result<HashMap<PostId, i64>> {
        let store = self.store.lock().unwrap();
        let mut counts = HashMap::new();
        for record in store.reactions.iter().filter(|r| r.reaction == reaction) {
            if post_ids.contains(&record.post_id) {
                *counts.entry(record.post_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn comment_counts(&self, post_ids: &[PostId]) -> Result<HashMap<PostId, i64>> {
        let store = self.store.lock().unwrap();
        let mut counts = HashMap::new();
        for (post_id, _) in &store.comments {
            if post_ids.contains(post_id) {
                *counts.entry(post_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn reacted(&self, reaction: Reaction, user_id: &str, post_ids: &[PostId]) -> Result<HashSet<PostId>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .reactions
            .iter()
            .filter(|r| r.reaction == reaction && r.user_id == user_id && post_ids.contains(&r.post_id))
            .map(|r| r.post_id.clone())
            .collect())
    }

    async fn find_reaction(&self, reaction: Reaction, user_id: &str, post_id: &str) -> Result<Option<String>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .reactions
            .iter()
            .find(|r| r.reaction == reaction && r.user_id == user_id && r.post_id == post_id)
            .map(|r| r.row_id.clone()))
    }

    async fn add_reaction(&self, reaction: Reaction, user_id: &str, post_id: &str) -> Result<()> {
        self.pause().await;
        let mut store = self.store.lock().unwrap();
        let row_id = store.next_id();
        store.reactions.push(ReactionRecord {
            row_id,
            reaction,
            user_id: user_id.to_string(),
            post_id: post_id.to_string(),
        });
        Ok(())
    }

    async fn remove_reaction(&self, _reaction: Reaction, row_id: &str) -> Result<()> {
        self.pause().await;
        self.store.lock().unwrap().reactions.retain(|r| r.row_id != row_id);
        Ok(())
    }

    async fn comments(&self, post_id: &str, limit: u32) -> Result<Vec<Comment>> {
        let store = self.store.lock().unwrap();
        let mut comments = store
            .comments
            .iter()
            .filter(|(id, _)| id == post_id)
            .map(|(_, c)| c.clone())
            .collect::<Vec<_>>();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        comments.truncate(limit as usize);
        Ok(comments)
    }

    async fn add_comment(&self, post_id: &str, user_id: &str, body: &str) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        let created_at = base_time() + chrono::Duration::minutes(store.comments.len() as i64);
        let id = store.next_id();
        let comment = Comment {
            id,
            body: body.to_string(),
            created_at,
            user_id: user_id.to_string(),
        };
        store.comments.push((post_id.to_string(), comment));
        Ok(())
    }
}

#[async_trait]
impl ProfileSource for FakeSource {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>> {
        Ok(self.store.lock().unwrap().profiles.get(user_id).cloned())
    }

    async fn profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>> {
        let store = self.store.lock().unwrap();
        Ok(user_ids.iter().filter_map(|id| store.profiles.get(id).cloned()).collect())
    }

    async fn profile_by_username(&self, username: &str) -> Result<Option<Profile>> {
        self.take_failure()?;
        let store = self.store.lock().unwrap();
        Ok(store.profiles.values().find(|p| p.username == username).cloned())
    }

    /// Without a pattern, profiles come sorted by username instead of creation time.
    async fn search_profiles(&self, pattern: Option<&str>, limit: u64) -> Result<Vec<Profile>> {
        self.take_failure()?;
        let pattern = pattern.map(str::to_lowercase);
        let store = self.store.lock().unwrap();
        let mut profiles = store
            .profiles
            .values()
            .filter(|p| !p.username.is_empty())
            .filter(|p| {
                pattern.as_ref().map_or(true, |pattern| {
                    p.username.to_lowercase().contains(pattern) || p.display_name.to_lowercase().contains(pattern)
                })
            })
            .cloned()
            .collect::<Vec<_>>();
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        profiles.truncate(limit as usize);
        Ok(profiles)
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<Profile> {
        let mut store = self.store.lock().unwrap();
        store.profile_inserts += 1;
        let taken = store.profiles.contains_key(&profile.id)
            || store.profiles.values().any(|p| p.username == profile.username);
        if taken {
            return Err(Error::ObjectAlreadyExists(format!("profile {}", profile.username)));
        }
        store.profiles.insert(profile.id.clone(), profile.clone());
        Ok(profile.clone())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile> {
        let mut store = self.store.lock().unwrap();
        store.profiles.insert(profile.id.clone(), profile.clone());
        Ok(profile.clone())
    }
}
