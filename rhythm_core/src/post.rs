use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type PostId = String;

/// The three kinds of content a user can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Poem,
    Song,
    Image,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Poem, ContentKind::Song, ContentKind::Image];

    /// Value of the `type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Poem => "poem",
            ContentKind::Song => "song",
            ContentKind::Image => "image",
        }
    }

    /// Section name used on cards and status lines.
    pub fn section(&self) -> &'static str {
        match self {
            ContentKind::Poem => "Poetry",
            ContentKind::Song => "Music",
            ContentKind::Image => "Art",
        }
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "poem" => Ok(ContentKind::Poem),
            "song" => Ok(ContentKind::Song),
            "image" => Ok(ContentKind::Image),
            _ => Err(Error::UnknownField(format!("content kind `{}`", s))),
        }
    }
}

/// Moderation state of a post. Only approved posts are public.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Pending,
    Approved,
    /// Approved, then hidden by its author.
    Hidden,
    Rejected,
}

impl PostStatus {
    /// Value of the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Approved => "approved",
            PostStatus::Hidden => "hidden",
            PostStatus::Rejected => "rejected",
        }
    }
}

impl Display for PostStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(PostStatus::Pending),
            "approved" => Ok(PostStatus::Approved),
            "hidden" => Ok(PostStatus::Hidden),
            "rejected" => Ok(PostStatus::Rejected),
            _ => Err(Error::UnknownField(format!("post status `{}`", s))),
        }
    }
}

/// A submission as fetched from the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: PostId,
    pub kind: ContentKind,
    pub title: String,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Post {
    /// Whether the record carries the full text needed for a detail view.
    pub fn has_body(&self) -> bool {
        self.body.as_deref().is_some_and(|b| !b.is_empty())
    }

    pub fn length_bucket(&self) -> LengthBucket {
        LengthBucket::classify(self.body.as_deref().unwrap_or_default())
    }
}

/// A validated submission, stored as pending until a moderator approves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub kind: ContentKind,
    pub title: String,
    pub body: Option<String>,
    pub song_url: Option<String>,
    pub image_url: Option<String>,
}

/// Columns to overwrite on an existing post. `None` leaves a column as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    pub song_url: Option<String>,
    pub image_url: Option<String>,
    pub status: Option<PostStatus>,
}

// MARK: Length bucket

pub const SHORT_MAX_LINES: usize = 6;
pub const SHORT_MAX_CHARS: usize = 240;
pub const MEDIUM_MAX_LINES: usize = 16;
pub const MEDIUM_MAX_CHARS: usize = 700;

/// Rough size of a poem, derived from its body. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthBucket {
    Short,
    Medium,
    Long,
}

impl LengthBucket {
    /// Lines are counted ignoring blank ones; characters are counted on the trimmed text.
    /// Either measure being small enough puts the text in the smaller bucket.
    pub fn classify(body: &str) -> LengthBucket {
        let lines = body.lines().filter(|l| !l.trim().is_empty()).count();
        let chars = body.trim().chars().count();

        if lines <= SHORT_MAX_LINES || chars <= SHORT_MAX_CHARS {
            LengthBucket::Short
        } else if lines <= MEDIUM_MAX_LINES || chars <= MEDIUM_MAX_CHARS {
            LengthBucket::Medium
        } else {
            LengthBucket::Long
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LengthBucket::Short => "short",
            LengthBucket::Medium => "medium",
            LengthBucket::Long => "long",
        }
    }
}

impl Display for LengthBucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LengthBucket {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "short" => Ok(LengthBucket::Short),
            "medium" => Ok(LengthBucket::Medium),
            "long" => Ok(LengthBucket::Long),
            _ => Err(Error::UnknownField(format!("length `{}`", s))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lines(count: usize, width: usize) -> String {
        vec!["x".repeat(width); count].join("\n")
    }

    #[test]
    fn test_classify_thresholds() {
        // 6 lines, 240 characters of text
        assert_eq!(LengthBucket::classify(&lines(6, 40)), LengthBucket::Short);
        assert_eq!(LengthBucket::classify(&lines(7, 50)), LengthBucket::Medium);
        assert_eq!(LengthBucket::classify(&lines(16, 60)), LengthBucket::Medium);
        assert_eq!(LengthBucket::classify(&lines(17, 50)), LengthBucket::Long);
    }

    #[test]
    fn test_classify_either_measure() {
        // Many tiny lines stay short by character count
        assert_eq!(LengthBucket::classify(&lines(30, 3)), LengthBucket::Short);
        // One huge line is short by line count
        assert_eq!(LengthBucket::classify(&"y".repeat(5000)), LengthBucket::Short);
        // Blank lines don't count
        let spaced = lines(7, 50).replace('\n', "\n\n  \n");
        assert_eq!(LengthBucket::classify(&spaced), LengthBucket::Medium);
        assert_eq!(LengthBucket::classify(""), LengthBucket::Short);
    }

    #[test]
    fn test_classify_is_stable() {
        let body = lines(20, 80);
        let first = LengthBucket::classify(&body);
        for _ in 0..10 {
            assert_eq!(LengthBucket::classify(&body), first);
        }
        assert_eq!(first, LengthBucket::Long);
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!("poem".parse::<ContentKind>().unwrap(), ContentKind::Poem);
        assert!("video".parse::<ContentKind>().is_err());
        assert_eq!("long".parse::<LengthBucket>().unwrap(), LengthBucket::Long);
        assert_eq!("hidden".parse::<PostStatus>().unwrap(), PostStatus::Hidden);
        assert!("deleted".parse::<PostStatus>().is_err());
    }
}
