use serde::Serialize;

use rhythm_core::social::Profile;
use rhythm_core::{ContentKind, Error, Post, PostSource, PostStatus, ProfileSource, Result};

/// Public page of one user: their profile and approved posts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPage {
    pub profile: Profile,
    pub name: String,
    /// `@username`
    pub handle: String,
    /// Website without its scheme, for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_label: Option<String>,
    /// `None` shows every kind.
    pub tab: Option<ContentKind>,
    pub posts: Vec<Post>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn website_label(website: &str) -> Option<String> {
    let website = website.trim();
    if website.is_empty() {
        return None;
    }
    let label = website
        .strip_prefix("https://")
        .or_else(|| website.strip_prefix("http://"))
        .unwrap_or(website);
    Some(label.to_string())
}

/// Look a user up by username (case-insensitive) and list their approved posts of the `tab` kind.
pub async fn user_page<S>(source: &S, username: &str, tab: Option<ContentKind>) -> Result<UserPage>
where
    S: PostSource + ProfileSource + ?Sized,
{
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(Error::InvalidField("missing username".to_string()));
    }
    let profile = source
        .profile_by_username(&username)
        .await?
        .ok_or_else(|| Error::ObjectNotFound(format!("user {}", username)))?;

    let posts = source
        .posts_by_user(&profile.id, Some(PostStatus::Approved))
        .await?
        .into_iter()
        .filter(|post| tab.map_or(true, |kind| post.kind == kind))
        .collect::<Vec<_>>();
    let message = posts.is_empty().then(|| "Nothing to show.".to_string());

    Ok(UserPage {
        name: Some(profile.display_name.trim())
            .filter(|n| !n.is_empty())
            .unwrap_or("User")
            .to_string(),
        handle: format!("@{}", profile.username.trim()),
        website_label: website_label(&profile.website),
        tab,
        posts,
        message,
        profile,
    })
}
