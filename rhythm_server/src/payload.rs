use serde::{Deserialize, Serialize};
use serde_with::rust::double_option;

use rhythm_core::query::{FeedFilter, SortOrder, TimeWindow, ViewMode};
use rhythm_core::{ContentKind, LengthBucket, Result};
use rhythm_feed::{FeedEvent, FeedSnapshot};

/// Request for mounting a new feed.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedRequest {
    pub kind: ContentKind,
    #[serde(default)]
    pub filter: FeedFilter,
    #[serde(default)]
    pub auto_load: bool,
    /// Overrides whether tag filtering is attempted for this feed.
    #[serde(default)]
    pub supports_tags: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedResponse {
    pub id: u64,
    #[serde(flatten)]
    pub snapshot: FeedSnapshot,
}

/// Changed filter controls. Absent fields stay as they are; `null` clears `length` or `tag`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterPatch {
    pub sort: Option<SortOrder>,
    pub window: Option<TimeWindow>,
    #[serde(default, with = "double_option")]
    pub length: Option<Option<LengthBucket>>,
    #[serde(default, with = "double_option")]
    pub tag: Option<Option<String>>,
    pub view: Option<ViewMode>,
}

impl FilterPatch {
    pub fn into_events(self) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        if let Some(sort) = self.sort {
            events.push(FeedEvent::SetSort(sort));
        }
        if let Some(window) = self.window {
            events.push(FeedEvent::SetWindow(window));
        }
        if let Some(length) = self.length {
            events.push(FeedEvent::SetLength(length));
        }
        if let Some(tag) = self.tag {
            events.push(FeedEvent::SetTag(tag.filter(|t| !t.trim().is_empty())));
        }
        if let Some(view) = self.view {
            events.push(FeedEvent::SetView(view));
        }
        events
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentinelRequest {
    pub epoch: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoLoadRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCommentRequest {
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToggleResponse {
    pub post_id: String,
    pub active: bool,
}

/// `?q=` of the site search and the people directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// `?tab=` of pages listing posts by kind. `all` or nothing lists every kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TabQuery {
    pub tab: Option<String>,
}

impl TabQuery {
    pub fn kind(&self) -> Result<Option<ContentKind>> {
        match self.tab.as_deref().map(str::trim) {
            None | Some("") | Some("all") => Ok(None),
            Some(tab) => tab.parse().map(Some),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedResponse {
    pub post_id: String,
    pub deleted: bool,
}
