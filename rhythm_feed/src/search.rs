// Site-wide search over people and approved posts, and the people directory.

use serde::Serialize;

use rhythm_core::query::escape_pattern;
use rhythm_core::social::Profile;
use rhythm_core::{Post, PostSource, ProfileSource, Result};

pub const SEARCH_PEOPLE_LIMIT: u64 = 18;
pub const SEARCH_POSTS_LIMIT: u64 = 24;
pub const DIRECTORY_LIMIT: u64 = 24;

/// A profile as listed in search results and the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonCard {
    pub id: String,
    pub username: String,
    pub name: String,
    /// First letter of the name, for the avatar placeholder.
    pub initial: String,
    /// `user.html?u=<username>`
    pub href: String,
}

impl PersonCard {
    pub fn from_profile(profile: &Profile) -> Self {
        let username = profile.username.trim().to_string();
        let name = Some(profile.display_name.trim())
            .filter(|n| !n.is_empty())
            .unwrap_or("User")
            .to_string();
        let initial = profile
            .name()
            .and_then(|n| n.chars().next())
            .unwrap_or('U')
            .to_uppercase()
            .to_string();
        PersonCard {
            href: format!("user.html?u={}", username),
            id: profile.id.clone(),
            username,
            name,
            initial,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub query: String,
    /// `Results for "<query>"`, or a prompt when nothing was typed.
    pub heading: String,
    pub people: Vec<PersonCard>,
    pub posts: Vec<Post>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub people_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts_message: Option<String>,
}

/// Search people by username or display name, and approved posts by title or text.
/// Both requests run together; either failing fails the search.
pub async fn search_all<S>(source: &S, text: &str) -> Result<SearchResults>
where
    S: PostSource + ProfileSource + ?Sized,
{
    let query = text.trim().to_string();
    let pattern = escape_pattern(&query);
    if pattern.is_empty() {
        return Ok(SearchResults {
            query,
            heading: "Type something to search.".to_string(),
            ..Default::default()
        });
    }

    let (people, posts) = futures::try_join!(
        source.search_profiles(Some(&pattern), SEARCH_PEOPLE_LIMIT),
        source.search_posts(&pattern, SEARCH_POSTS_LIMIT),
    )?;
    tracing::debug!("Search {:?} found {} people and {} posts", query, people.len(), posts.len());

    Ok(SearchResults {
        heading: format!("Results for \"{}\"", query),
        people_message: people.is_empty().then(|| "No people found.".to_string()),
        posts_message: posts.is_empty().then(|| "No posts found.".to_string()),
        people: people.iter().map(PersonCard::from_profile).collect(),
        posts,
        query,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Directory {
    pub people: Vec<PersonCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Newest profiles, or those matching `text`.
pub async fn directory<S>(source: &S, text: &str) -> Result<Directory>
where
    S: ProfileSource + ?Sized,
{
    let pattern = Some(escape_pattern(text)).filter(|p| !p.is_empty());
    let people = source.search_profiles(pattern.as_deref(), DIRECTORY_LIMIT).await?;
    let message = match (people.is_empty(), pattern.is_some()) {
        (false, _) => None,
        (true, true) => Some("No matches.".to_string()),
        (true, false) => Some("No profiles yet.".to_string()),
    };
    Ok(Directory {
        people: people.iter().map(PersonCard::from_profile).collect(),
        message,
    })
}
