// Submitting posts, and the author's own list of them on the profile page.

use serde::{Deserialize, Serialize};

use rhythm_core::social::SessionUser;
use rhythm_core::{ContentKind, Error, NewPost, Post, PostChanges, PostSource, PostStatus, Result};

pub const TITLE_MAX_CHARS: usize = 80;

/// The submit form. Which of `body` and `song_url` is needed depends on `kind`.
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub kind: ContentKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub song_url: String,
}

fn required(value: &str, message: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidField(message.to_string()));
    }
    Ok(value.to_string())
}

fn title(value: &str) -> Result<String> {
    let title = required(value, "Please add a title.")?;
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(Error::InvalidField(format!("Titles are at most {} characters.", TITLE_MAX_CHARS)));
    }
    Ok(title)
}

impl Submission {
    /// Trimmed fields, or the first problem found.
    pub fn validate(&self) -> Result<NewPost> {
        let title = title(&self.title)?;
        let (body, song_url) = match self.kind {
            ContentKind::Poem => (Some(required(&self.body, "Please paste your poem.")?), None),
            ContentKind::Song => (None, Some(required(&self.song_url, "Please paste a song link.")?)),
            ContentKind::Image => {
                return Err(Error::InvalidField("Image uploads are not supported here.".to_string()));
            }
        };
        Ok(NewPost {
            kind: self.kind,
            title,
            body,
            song_url,
            image_url: None,
        })
    }
}

/// Store a submission as pending until a moderator approves it.
pub async fn submit_post<S>(source: &S, user: &SessionUser, submission: &Submission) -> Result<Post>
where
    S: PostSource + ?Sized,
{
    let post = submission.validate()?;
    let post = source.insert_post(&user.id, &post).await?;
    tracing::info!("User {} submitted {} {}", user.id, post.kind, post.id);
    Ok(post)
}

// MARK: Own posts

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PostStats {
    pub all: usize,
    pub poems: usize,
    pub songs: usize,
    pub images: usize,
}

impl PostStats {
    pub fn count(posts: &[Post]) -> Self {
        let of = |kind| posts.iter().filter(|p| p.kind == kind).count();
        PostStats {
            all: posts.len(),
            poems: of(ContentKind::Poem),
            songs: of(ContentKind::Song),
            images: of(ContentKind::Image),
        }
    }
}

/// The author's posts in every status. Stats always count every kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MyPosts {
    pub stats: PostStats,
    pub tab: Option<ContentKind>,
    pub posts: Vec<Post>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub async fn my_posts<S>(source: &S, user: &SessionUser, tab: Option<ContentKind>) -> Result<MyPosts>
where
    S: PostSource + ?Sized,
{
    let posts = source.posts_by_user(&user.id, None).await?;
    let stats = PostStats::count(&posts);
    let posts = posts
        .into_iter()
        .filter(|post| tab.map_or(true, |kind| post.kind == kind))
        .collect::<Vec<_>>();
    let message = posts.is_empty().then(|| "No submissions in this tab yet.".to_string());
    Ok(MyPosts {
        stats,
        tab,
        posts,
        message,
    })
}

/// The edit form. Only the field matching the post's kind is written.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostEdit {
    pub title: String,
    pub body: String,
    pub song_url: String,
    pub image_url: String,
}

async fn own_post<S>(source: &S, user: &SessionUser, id: &str) -> Result<Post>
where
    S: PostSource + ?Sized,
{
    source
        .fetch_own_post(id, &user.id)
        .await?
        .ok_or_else(|| Error::ObjectNotFound(format!("post {}", id)))
}

pub async fn edit_post<S>(source: &S, user: &SessionUser, id: &str, edit: &PostEdit) -> Result<Post>
where
    S: PostSource + ?Sized,
{
    let post = own_post(source, user, id).await?;
    let mut changes = PostChanges {
        title: Some(title(&edit.title)?),
        ..Default::default()
    };
    match post.kind {
        ContentKind::Poem => changes.body = Some(required(&edit.body, "Please paste your poem.")?),
        ContentKind::Song => changes.song_url = Some(required(&edit.song_url, "Please paste a song link.")?),
        ContentKind::Image => changes.image_url = Some(required(&edit.image_url, "Please add an image link.")?),
    }
    let post = source.update_post(id, &user.id, &changes).await?;
    tracing::info!("User {} edited post {}", user.id, id);
    Ok(post)
}

pub async fn delete_post<S>(source: &S, user: &SessionUser, id: &str) -> Result<()>
where
    S: PostSource + ?Sized,
{
    source.delete_post(id, &user.id).await?;
    tracing::info!("User {} deleted post {}", user.id, id);
    Ok(())
}

/// Hide an approved post, or bring a hidden one back. Pending posts stay in the moderation queue.
pub async fn toggle_hidden<S>(source: &S, user: &SessionUser, id: &str) -> Result<Post>
where
    S: PostSource + ?Sized,
{
    let post = own_post(source, user, id).await?;
    let status = match post.status {
        PostStatus::Approved => PostStatus::Hidden,
        PostStatus::Hidden => PostStatus::Approved,
        status => {
            return Err(Error::InvalidField(format!("a {} post can't be hidden", status)));
        }
    };
    let changes = PostChanges {
        status: Some(status),
        ..Default::default()
    };
    let post = source.update_post(id, &user.id, &changes).await?;
    tracing::info!("User {} set post {} to {}", user.id, id, post.status);
    Ok(post)
}
