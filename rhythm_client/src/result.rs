use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use rhythm_util::iso8601;

/// Row ids come back as strings (uuid) or numbers (bigserial) depending on the table.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        String(String),
        Number(i64),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::String(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "id_string")] String);
    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

/// Error body of a failed request.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct APIErrorBody {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PostRow {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub song_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "optional_id_string")]
    pub user_id: Option<String>,
}

/// Body of a post insert. Absent media columns are sent as `null`.
#[derive(Serialize, Debug, Clone)]
pub struct NewPostRow<'a> {
    #[serde(rename = "type")]
    pub type_: &'a str,
    pub title: &'a str,
    pub body_text: Option<&'a str>,
    pub song_url: Option<&'a str>,
    pub image_url: Option<&'a str>,
    pub status: &'a str,
    pub user_id: &'a str,
}

/// Body of a post update. Only the present columns are written.
#[derive(Serialize, Debug, Clone, Default)]
pub struct PostPatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'a str>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ProfileRow {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewProfile {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub bio: String,
    pub website: String,
}

/// One row of `post_like_counts`, `post_save_counts` or `post_comment_counts`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CountRow {
    #[serde(deserialize_with = "id_string")]
    pub post_id: String,
    #[serde(alias = "like_count", alias = "save_count", alias = "comment_count", default)]
    pub count: Option<i64>,
}

/// One row of `post_likes` or `post_saves`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ReactionRow {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "id_string")]
    pub post_id: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewReaction<'a> {
    pub post_id: &'a str,
    pub user_id: &'a str,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CommentRow {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub body: String,
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "id_string")]
    pub user_id: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewComment<'a> {
    pub post_id: &'a str,
    pub user_id: &'a str,
    pub body: &'a str,
}

/// The signed-in user as returned by the auth service.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct UserRow {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Rows of one page together with the total reported by the backend, if counted.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionTable {
    Likes,
    Saves,
}

impl ReactionTable {
    pub fn table(&self) -> &'static str {
        match self {
            ReactionTable::Likes => "post_likes",
            ReactionTable::Saves => "post_saves",
        }
    }

    pub fn count_view(&self) -> &'static str {
        match self {
            ReactionTable::Likes => "post_like_counts",
            ReactionTable::Saves => "post_save_counts",
        }
    }
}

impl Display for ReactionTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table())
    }
}
