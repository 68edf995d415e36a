// Translation of the listing page's filter controls into one remote query.
// Everything here is pure: the clock is passed in, nothing is fetched.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::post::{ContentKind, LengthBucket};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[default]
    All,
    Day,
    Week,
    Month,
}

impl TimeWindow {
    /// Earliest creation time still inside the window.
    pub fn lower_bound(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = match self {
            TimeWindow::All => return None,
            TimeWindow::Day => 1,
            TimeWindow::Week => 7,
            TimeWindow::Month => 30,
        };
        Some(now - Duration::days(days))
    }

    fn label(&self) -> Option<&'static str> {
        match self {
            TimeWindow::All => None,
            TimeWindow::Day => Some("past day"),
            TimeWindow::Week => Some("past week"),
            TimeWindow::Month => Some("past month"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    Az,
}

impl SortOrder {
    /// `(column, ascending)` pairs, most significant first.
    pub fn order_terms(&self) -> &'static [(&'static str, bool)] {
        match self {
            SortOrder::Newest => &[("created_at", false)],
            SortOrder::Oldest => &[("created_at", true)],
            SortOrder::Az => &[("title", true), ("created_at", false)],
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SortOrder::Newest => "newest",
            SortOrder::Oldest => "oldest",
            SortOrder::Az => "A-Z",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Grid,
}

/// State of the filter controls of one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedFilter {
    pub search: String,
    pub window: TimeWindow,
    pub sort: SortOrder,
    pub length: Option<LengthBucket>,
    pub tag: Option<String>,
    pub view: ViewMode,
}

impl FeedFilter {
    /// Search text as typed, trimmed. `None` when blank.
    pub fn search_text(&self) -> Option<&str> {
        Some(self.search.trim()).filter(|s| !s.is_empty())
    }

    /// Short human readable parts for the "Showing N ..." line.
    pub fn describe(&self, tags_enabled: bool) -> Vec<String> {
        let mut parts = Vec::new();
        if let Some(text) = self.search_text() {
            parts.push(format!("\"{}\"", text));
        }
        if let Some(label) = self.window.label() {
            parts.push(label.to_string());
        }
        if let Some(length) = self.length {
            parts.push(length.to_string());
        }
        if let (Some(tag), true) = (&self.tag, tags_enabled) {
            parts.push(format!("#{}", tag));
        }
        parts.push(self.sort.label().to_string());
        parts
    }
}

/// Immutable description of one remote page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub kind: ContentKind,
    /// Escaped `ilike` pattern body matched against title or body text.
    pub pattern: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub tag: Option<String>,
    pub sort: SortOrder,
    pub offset: u64,
    pub limit: u64,
}

impl PostQuery {
    pub fn build(
        kind: ContentKind,
        filter: &FeedFilter,
        tags_enabled: bool,
        now: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Self {
        let pattern = filter
            .search_text()
            .map(escape_pattern)
            .filter(|p| !p.is_empty());
        let tag = filter
            .tag
            .as_ref()
            .map(|t| t.trim().to_string())
            .filter(|t| tags_enabled && !t.is_empty());

        PostQuery {
            kind,
            pattern,
            since: filter.window.lower_bound(now),
            tag,
            sort: filter.sort,
            offset,
            limit,
        }
    }

    pub fn has_tag(&self) -> bool {
        self.tag.is_some()
    }

    /// Same request without the tag predicate, for deployments that can't evaluate it.
    pub fn without_tag(&self) -> Self {
        PostQuery {
            tag: None,
            ..self.clone()
        }
    }

    /// Same request at another offset.
    pub fn at(&self, offset: u64) -> Self {
        PostQuery { offset, ..self.clone() }
    }
}

/// Escape `ilike` wildcards and drop the separators of the `or=(...)` grammar.
pub fn escape_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ',' | '(' | ')' | '*' => {}
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_build_default_query() {
        let query = PostQuery::build(ContentKind::Poem, &FeedFilter::default(), true, now(), 0, 10);
        assert_eq!(query.kind, ContentKind::Poem);
        assert!(query.pattern.is_none());
        assert!(query.since.is_none());
        assert!(query.tag.is_none());
        assert_eq!(query.sort, SortOrder::Newest);
        assert_eq!((query.offset, query.limit), (0, 10));
    }

    #[test]
    fn test_build_full_query() {
        let filter = FeedFilter {
            search: "  100%_sure*, (maybe) ".to_string(),
            window: TimeWindow::Week,
            sort: SortOrder::Az,
            length: Some(LengthBucket::Long),
            tag: Some("love".to_string()),
            view: ViewMode::Grid,
        };
        let query = PostQuery::build(ContentKind::Poem, &filter, true, now(), 20, 10);
        assert_eq!(query.pattern.as_deref(), Some("100\\%\\_sure maybe"));
        assert_eq!(query.since, Some(Utc.with_ymd_and_hms(2024, 6, 8, 12, 0, 0).unwrap()));
        assert_eq!(query.tag.as_deref(), Some("love"));
        assert_eq!(query.offset, 20);

        let stripped = query.without_tag();
        assert!(!stripped.has_tag());
        assert_eq!(stripped.pattern, query.pattern);
        assert_eq!(query.at(30).offset, 30);
    }

    #[test]
    fn test_tag_requires_support() {
        let filter = FeedFilter {
            tag: Some("love".to_string()),
            ..Default::default()
        };
        let query = PostQuery::build(ContentKind::Poem, &filter, false, now(), 0, 10);
        assert!(!query.has_tag());
    }

    #[test]
    fn test_search_of_only_separators_is_ignored() {
        let filter = FeedFilter {
            search: " ,() ".to_string(),
            ..Default::default()
        };
        let query = PostQuery::build(ContentKind::Poem, &filter, true, now(), 0, 10);
        assert!(query.pattern.is_none());
    }

    #[test]
    fn test_windows() {
        assert_eq!(TimeWindow::All.lower_bound(now()), None);
        assert_eq!(TimeWindow::Day.lower_bound(now()), Some(now() - Duration::days(1)));
        assert_eq!(TimeWindow::Month.lower_bound(now()), Some(now() - Duration::days(30)));
    }

    #[test]
    fn test_describe() {
        let filter = FeedFilter {
            search: "rain".to_string(),
            window: TimeWindow::Day,
            length: Some(LengthBucket::Short),
            tag: Some("sad".to_string()),
            ..Default::default()
        };
        assert_eq!(
            filter.describe(true),
            vec!["\"rain\"", "past day", "short", "#sad", "newest"]
        );
        assert_eq!(filter.describe(false), vec!["\"rain\"", "past day", "short", "newest"]);
    }
}
