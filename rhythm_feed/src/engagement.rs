use std::collections::HashSet;
use std::sync::Mutex;

use itertools::Itertools;

use rhythm_core::social::{CommentView, Counts, Engagement, Profile, Reaction, SessionUser};
use rhythm_core::{EngagementSource, Error, PostId, ProfileSource, Result};

/// Comments shown under a post.
pub const COMMENT_LIMIT: u32 = 80;

type ToggleKey = (String, String, Reaction);

/// Likes, saves and comments. Sources are passed per call since writes act as the signed-in user.
#[derive(Debug, Default)]
pub struct EngagementService {
    toggles: Mutex<HashSet<ToggleKey>>,
}

/// Holds a toggle slot; released on drop, whatever the outcome.
struct TogglePermit<'a> {
    toggles: &'a Mutex<HashSet<ToggleKey>>,
    key: ToggleKey,
}

impl Drop for TogglePermit<'_> {
    fn drop(&mut self) {
        if let Ok(mut toggles) = self.toggles.lock() {
            toggles.remove(&self.key);
        }
    }
}

fn require_user(user: Option<&SessionUser>) -> Result<&SessionUser> {
    user.ok_or_else(|| Error::NotLoggedIn("sign in to react or comment".to_string()))
}

impl EngagementService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for every post, plus the viewer's own reactions when signed in.
    pub async fn engagement<S>(&self, source: &S, user: Option<&SessionUser>, post_ids: &[PostId]) -> Result<Vec<Engagement>>
    where
        S: EngagementSource + ?Sized,
    {
        let post_ids = post_ids.iter().unique().cloned().collect::<Vec<_>>();
        let (likes, saves, comments) = futures::try_join!(
            source.reaction_counts(Reaction::Like, &post_ids),
            source.reaction_counts(Reaction::Save, &post_ids),
            source.comment_counts(&post_ids),
        )?;
        let (liked, saved) = match user {
            Some(user) => futures::try_join!(
                source.reacted(Reaction::Like, &user.id, &post_ids),
                source.reacted(Reaction::Save, &user.id, &post_ids),
            )?,
            None => (HashSet::new(), HashSet::new()),
        };

        Ok(post_ids
            .into_iter()
            .map(|id| Engagement {
                counts: Counts {
                    likes: likes.get(&id).copied().unwrap_or(0),
                    saves: saves.get(&id).copied().unwrap_or(0),
                    comments: comments.get(&id).copied().unwrap_or(0),
                },
                liked: liked.contains(&id),
                saved: saved.contains(&id),
                post_id: id,
            })
            .collect())
    }

    /// Flip the user's reaction to a post. Returns whether the reaction is now set.
    /// A second toggle of the same reaction while one is running fails with `Busy`.
    pub async fn toggle<S>(&self, source: &S, user: Option<&SessionUser>, post_id: &str, reaction: Reaction) -> Result<bool>
    where
        S: EngagementSource + ?Sized,
    {
        let user = require_user(user)?;
        let _permit = self.acquire((user.id.clone(), post_id.to_string(), reaction))?;

        match source.find_reaction(reaction, &user.id, post_id).await? {
            Some(row_id) => {
                source.remove_reaction(reaction, &row_id).await?;
                tracing::info!("User {} removed {} of post {}", user.id, reaction, post_id);
                Ok(false)
            }
            None => {
                source.add_reaction(reaction, &user.id, post_id).await?;
                tracing::info!("User {} added {} to post {}", user.id, reaction, post_id);
                Ok(true)
            }
        }
    }

    fn acquire(&self, key: ToggleKey) -> Result<TogglePermit<'_>> {
        let mut toggles = self
            .toggles
            .lock()
            .map_err(|_| Error::Other(anyhow::anyhow!("toggle registry poisoned")))?;
        if !toggles.insert(key.clone()) {
            tracing::warn!("Rejected concurrent {} of post {} by {}", key.2, key.1, key.0);
            return Err(Error::Busy(format!("{} of post {} already in progress", key.2, key.1)));
        }
        Ok(TogglePermit {
            toggles: &self.toggles,
            key,
        })
    }

    /// Newest comments first, with author names resolved.
    pub async fn comments<S>(&self, source: &S, post_id: &str) -> Result<Vec<CommentView>>
    where
        S: EngagementSource + ProfileSource + ?Sized,
    {
        let comments = source.comments(post_id, COMMENT_LIMIT).await?;
        let user_ids = comments.iter().map(|c| c.user_id.clone()).unique().collect::<Vec<_>>();
        let profiles = if user_ids.is_empty() {
            vec![]
        } else {
            source.profiles(&user_ids).await?
        };

        Ok(comments
            .into_iter()
            .map(|comment| {
                let profile = profiles.iter().find(|p| p.id == comment.user_id);
                CommentView {
                    author: author_name(profile, &comment.user_id),
                    id: comment.id,
                    body: comment.body,
                    created_at: comment.created_at,
                }
            })
            .collect())
    }

    pub async fn post_comment<S>(&self, source: &S, user: Option<&SessionUser>, post_id: &str, body: &str) -> Result<()>
    where
        S: EngagementSource + ?Sized,
    {
        let user = require_user(user)?;
        let body = body.trim();
        if body.is_empty() {
            return Err(Error::InvalidField("comment is empty".to_string()));
        }
        source.add_comment(post_id, &user.id, body).await?;
        tracing::info!("User {} commented on post {}", user.id, post_id);
        Ok(())
    }
}

/// Display name, else username, else a short form of the user id.
pub fn author_name(profile: Option<&Profile>, user_id: &str) -> String {
    match profile.and_then(|p| p.name()) {
        Some(name) => name.to_string(),
        None => format!("User: {}", user_id.chars().take(8).collect::<String>()),
    }
}
