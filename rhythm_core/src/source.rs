// Seams between the domain logic and the hosted backend.
// Production implementations live in `rhythm_feed::api`; tests use in-memory fakes.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::Result;
use crate::post::{NewPost, Post, PostChanges, PostId, PostStatus};
use crate::query::PostQuery;
use crate::social::{Comment, Profile, Reaction};

/// One remote page of posts.
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    pub posts: Vec<Post>,
    /// Total size of the result set, when the backend reports it.
    pub total: Option<u64>,
}

/// Ordered, paginated access to approved posts, and an author's access to their own.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetch the rows in `query.offset..query.offset + query.limit`.
    async fn fetch_page(&self, query: &PostQuery) -> Result<PostPage>;

    /// Fetch one approved post by id. `None` if it doesn't exist or isn't visible.
    async fn fetch_post(&self, id: &str) -> Result<Option<Post>>;

    /// Approved posts of every kind whose title or body contains the escaped `pattern`, newest first.
    async fn search_posts(&self, pattern: &str, limit: u64) -> Result<Vec<Post>>;

    /// Posts of one author, newest first. `status` keeps only posts in that state.
    async fn posts_by_user(&self, user_id: &str, status: Option<PostStatus>) -> Result<Vec<Post>>;

    /// One post of `user_id`, whatever its status.
    async fn fetch_own_post(&self, id: &str, user_id: &str) -> Result<Option<Post>>;

    async fn insert_post(&self, user_id: &str, post: &NewPost) -> Result<Post>;

    /// Fails with `ObjectNotFound` if the user owns no such post.
    async fn update_post(&self, id: &str, user_id: &str, changes: &PostChanges) -> Result<Post>;

    /// Fails with `ObjectNotFound` if the user owns no such post.
    async fn delete_post(&self, id: &str, user_id: &str) -> Result<()>;
}

/// Likes, saves and comments.
#[async_trait]
pub trait EngagementSource: Send + Sync {
    /// Reaction counters per post. Posts without a row are absent.
    async fn reaction_counts(&self, reaction: Reaction, post_ids: &[PostId]) -> Result<HashMap<PostId, i64>>;
    async fn comment_counts(&self, post_ids: &[PostId]) -> Result<HashMap<PostId, i64>>;

    /// Which of `post_ids` the user reacted to.
    async fn reacted(&self, reaction: Reaction, user_id: &str, post_ids: &[PostId]) -> Result<HashSet<PostId>>;
    /// Row id of the user's reaction to the post, if any.
    async fn find_reaction(&self, reaction: Reaction, user_id: &str, post_id: &str) -> Result<Option<String>>;
    async fn add_reaction(&self, reaction: Reaction, user_id: &str, post_id: &str) -> Result<()>;
    async fn remove_reaction(&self, reaction: Reaction, row_id: &str) -> Result<()>;

    /// Newest first.
    async fn comments(&self, post_id: &str, limit: u32) -> Result<Vec<Comment>>;
    async fn add_comment(&self, post_id: &str, user_id: &str, body: &str) -> Result<()>;
}

#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>>;
    async fn profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>>;
    async fn profile_by_username(&self, username: &str) -> Result<Option<Profile>>;
    /// Profiles that have a username. With a `pattern`, those whose username or display name
    /// contains it; without one, the newest.
    async fn search_profiles(&self, pattern: Option<&str>, limit: u64) -> Result<Vec<Profile>>;
    /// Plain insert. Fails with `ObjectAlreadyExists` on a unique violation (id or username).
    async fn insert_profile(&self, profile: &Profile) -> Result<Profile>;
    /// Insert or merge on id.
    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile>;
}
