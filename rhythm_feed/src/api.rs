use std::collections::{HashMap, HashSet};
use std::future::Future;

use async_trait::async_trait;
use chrono::SecondsFormat;
use itertools::Itertools;

use rhythm_client::{
    CommentRow, Error as ClientError, NewComment, NewPostRow, NewProfile, NewReaction, Params, PostPatch, PostRow,
    ProfileRow, ReactionRow, ReactionTable, RestClient, POST_COLUMNS, PROFILE_COLUMNS,
};
use rhythm_core::query::PostQuery;
use rhythm_core::social::{Comment, Profile, Reaction, SessionUser};
use rhythm_core::{
    ContentKind, EngagementSource, Error, NewPost, Post, PostChanges, PostId, PostPage, PostSource, PostStatus,
    ProfileSource, Result,
};
use rhythm_util::build_params;

pub const RETRY_DELAY_MS: u64 = 500;
pub const RETRY_COUNT: usize = 2;

/// The hosted backend behind all three source traits.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    client: RestClient,
}

impl RemoteBackend {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = RestClient::new(base_url, api_key).map_err(remote_error)?;
        Ok(RemoteBackend { client })
    }

    /// Same backend, acting as the owner of `access_token`.
    pub fn for_user(&self, access_token: &str) -> Result<Self> {
        let client = self.client.with_access_token(access_token).map_err(remote_error)?;
        Ok(RemoteBackend { client })
    }

    /// Resolve the user behind the current token.
    pub async fn session_user(&self) -> Result<SessionUser> {
        let user = self.client.user().await.map_err(remote_error)?;
        Ok(SessionUser {
            id: user.id,
            email: user.email,
        })
    }
}

// MARK: Posts

#[async_trait]
impl PostSource for RemoteBackend {
    async fn fetch_page(&self, query: &PostQuery) -> Result<PostPage> {
        let params = post_params(query);
        let page = retry(|| {
            self.client
                .select_page::<PostRow>("posts", params.clone(), query.offset, query.limit)
        })
        .await
        .map_err(remote_error)?;

        let posts = page.rows.into_iter().map(|row| post_from_row(row, query.kind)).collect();
        Ok(PostPage {
            posts,
            total: page.total,
        })
    }

    async fn fetch_post(&self, id: &str) -> Result<Option<Post>> {
        let row = retry(|| self.client.post(id, "*")).await.map_err(remote_error)?;
        Ok(row.and_then(typed_post))
    }

    async fn search_posts(&self, pattern: &str, limit: u64) -> Result<Vec<Post>> {
        let params = build_params! {
            required select => POST_COLUMNS,
            filter status => ("eq", PostStatus::Approved.as_str()),
            required or => format!("(title.ilike.*{p}*,body_text.ilike.*{p}*)", p = pattern),
            required order => "created_at.desc",
            required limit,
        };
        let rows = retry(|| self.client.select::<PostRow>("posts", params.clone()))
            .await
            .map_err(remote_error)?;
        Ok(rows.into_iter().filter_map(typed_post).collect())
    }

    async fn posts_by_user(&self, user_id: &str, status: Option<PostStatus>) -> Result<Vec<Post>> {
        let status = status.map(|s| ("eq", s.as_str()));
        let params = build_params! {
            required select => POST_COLUMNS,
            filter user_id => ("eq", user_id),
            filter_opt status,
            required order => "created_at.desc",
        };
        let rows = retry(|| self.client.select::<PostRow>("posts", params.clone()))
            .await
            .map_err(remote_error)?;
        Ok(rows.into_iter().filter_map(typed_post).collect())
    }

    async fn fetch_own_post(&self, id: &str, user_id: &str) -> Result<Option<Post>> {
        let row = retry(|| self.client.own_post(id, user_id, POST_COLUMNS))
            .await
            .map_err(remote_error)?;
        Ok(row.and_then(typed_post))
    }

    async fn insert_post(&self, user_id: &str, post: &NewPost) -> Result<Post> {
        let row = NewPostRow {
            type_: post.kind.as_str(),
            title: &post.title,
            body_text: post.body.as_deref(),
            song_url: post.song_url.as_deref(),
            image_url: post.image_url.as_deref(),
            status: PostStatus::Pending.as_str(),
            user_id,
        };
        let rows = self
            .client
            .insert::<_, PostRow>("posts", &row, POST_COLUMNS)
            .await
            .map_err(remote_error)?;
        first_post(rows, "new post")
    }

    async fn update_post(&self, id: &str, user_id: &str, changes: &PostChanges) -> Result<Post> {
        let patch = PostPatch {
            title: changes.title.as_deref(),
            body_text: changes.body.as_deref(),
            song_url: changes.song_url.as_deref(),
            image_url: changes.image_url.as_deref(),
            status: changes.status.as_ref().map(PostStatus::as_str),
        };
        let params = build_params! {
            filter id => ("eq", id),
            filter user_id => ("eq", user_id),
        };
        let rows = self
            .client
            .update::<_, PostRow>("posts", params, &patch, POST_COLUMNS)
            .await
            .map_err(remote_error)?;
        first_post(rows, id)
    }

    async fn delete_post(&self, id: &str, user_id: &str) -> Result<()> {
        let params = build_params! {
            filter id => ("eq", id),
            filter user_id => ("eq", user_id),
        };
        let rows = self
            .client
            .delete_returning::<PostRow>("posts", params, POST_COLUMNS)
            .await
            .map_err(remote_error)?;
        first_post(rows, id).map(|_| ())
    }
}

/// Filters of one listing request. Offset and limit are added by the client.
pub fn post_params(query: &PostQuery) -> Params {
    let or = query
        .pattern
        .as_ref()
        .map(|p| format!("(title.ilike.*{p}*,body_text.ilike.*{p}*)"));
    let created_at = query
        .since
        .map(|since| ("gte", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
    let tags = query.tag.as_ref().map(|tag| ("cs", format!("{{{}}}", tag)));
    let order = query
        .sort
        .order_terms()
        .iter()
        .map(|(column, ascending)| format!("{}.{}", column, if *ascending { "asc" } else { "desc" }))
        .join(",");

    let mut params = build_params! { required select => "*" };
    params.push(("type".to_string(), format!("eq.{}", query.kind.as_str())));
    params.extend(build_params! {
        filter status => ("eq", "approved"),
        optional or,
        filter_opt created_at,
        filter_opt tags,
        required order,
    });
    params
}

fn post_from_row(row: PostRow, kind: ContentKind) -> Post {
    let kind = row
        .type_
        .as_deref()
        .and_then(|t| t.parse::<ContentKind>().ok())
        .unwrap_or(kind);
    // Listings only select approved rows
    let status = row
        .status
        .as_deref()
        .and_then(|s| s.parse::<PostStatus>().ok())
        .unwrap_or(PostStatus::Approved);
    Post {
        id: row.id,
        kind,
        status,
        title: row
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string()),
        body: row.body_text,
        song_url: row.song_url,
        image_url: row.image_url,
        created_at: row.created_at,
        tags: row.tags.unwrap_or_default(),
        user_id: row.user_id,
    }
}

/// Rows of mixed kinds must name their kind; others are skipped.
fn typed_post(row: PostRow) -> Option<Post> {
    let kind = row.type_.as_deref().and_then(|t| t.parse::<ContentKind>().ok())?;
    Some(post_from_row(row, kind))
}

fn first_post(rows: Vec<PostRow>, id: &str) -> Result<Post> {
    rows.into_iter()
        .next()
        .and_then(typed_post)
        .ok_or_else(|| Error::ObjectNotFound(format!("post {}", id)))
}

// MARK: Engagement

fn reaction_table(reaction: Reaction) -> ReactionTable {
    match reaction {
        Reaction::Like => ReactionTable::Likes,
        Reaction::Save => ReactionTable::Saves,
    }
}

fn count_column(reaction: Reaction) -> &'static str {
    match reaction {
        Reaction::Like => "like_count",
        Reaction::Save => "save_count",
    }
}

#[async_trait]
impl EngagementSource for RemoteBackend {
    async fn reaction_counts(&self, reaction: Reaction, post_ids: &[PostId]) -> Result<HashMap<PostId, i64>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let view = reaction_table(reaction).count_view();
        let rows = retry(|| self.client.counts(view, count_column(reaction), post_ids))
            .await
            .map_err(remote_error)?;
        Ok(rows.into_iter().map(|r| (r.post_id, r.count.unwrap_or(0))).collect())
    }

    async fn comment_counts(&self, post_ids: &[PostId]) -> Result<HashMap<PostId, i64>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = retry(|| self.client.counts("post_comment_counts", "comment_count", post_ids))
            .await
            .map_err(remote_error)?;
        Ok(rows.into_iter().map(|r| (r.post_id, r.count.unwrap_or(0))).collect())
    }

    async fn reacted(&self, reaction: Reaction, user_id: &str, post_ids: &[PostId]) -> Result<HashSet<PostId>> {
        if post_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = retry(|| self.client.reactions(reaction_table(reaction), user_id, post_ids))
            .await
            .map_err(remote_error)?;
        Ok(rows.into_iter().map(|r| r.post_id).collect())
    }

    async fn find_reaction(&self, reaction: Reaction, user_id: &str, post_id: &str) -> Result<Option<String>> {
        let params = build_params! {
            required select => "id,post_id",
            filter post_id => ("eq", post_id),
            filter user_id => ("eq", user_id),
            required limit => 1,
        };
        let rows = self
            .client
            .select::<ReactionRow>(reaction_table(reaction).table(), params)
            .await
            .map_err(remote_error)?;
        Ok(rows.into_iter().next().map(|r| r.id))
    }

    async fn add_reaction(&self, reaction: Reaction, user_id: &str, post_id: &str) -> Result<()> {
        let row = NewReaction { post_id, user_id };
        self.client
            .insert::<_, ReactionRow>(reaction_table(reaction).table(), &row, "id,post_id")
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn remove_reaction(&self, reaction: Reaction, row_id: &str) -> Result<()> {
        let params = build_params! { filter id => ("eq", row_id) };
        self.client
            .delete(reaction_table(reaction).table(), params)
            .await
            .map_err(remote_error)
    }

    async fn comments(&self, post_id: &str, limit: u32) -> Result<Vec<Comment>> {
        let rows = retry(|| self.client.comments(post_id, limit))
            .await
            .map_err(remote_error)?;
        Ok(rows.into_iter().map(comment_from_row).collect())
    }

    async fn add_comment(&self, post_id: &str, user_id: &str, body: &str) -> Result<()> {
        let row = NewComment { post_id, user_id, body };
        self.client
            .insert::<_, CommentRow>("post_comments", &row, "id,body,created_at,user_id")
            .await
            .map_err(remote_error)?;
        Ok(())
    }
}

fn comment_from_row(row: CommentRow) -> Comment {
    Comment {
        id: row.id,
        body: row.body,
        created_at: row.created_at,
        user_id: row.user_id,
    }
}

// MARK: Profiles

fn profile_from_row(row: ProfileRow) -> Profile {
    Profile {
        id: row.id,
        username: row.username.unwrap_or_default(),
        display_name: row.display_name.unwrap_or_default(),
        bio: row.bio.unwrap_or_default(),
        website: row.website.unwrap_or_default(),
        avatar_url: row.avatar_url.unwrap_or_default(),
    }
}

fn new_profile(profile: &Profile) -> NewProfile {
    NewProfile {
        id: profile.id.clone(),
        username: profile.username.clone(),
        display_name: profile.display_name.clone(),
        bio: profile.bio.clone(),
        website: profile.website.clone(),
    }
}

fn first_profile(rows: Vec<ProfileRow>, id: &str) -> Result<Profile> {
    rows.into_iter()
        .next()
        .map(profile_from_row)
        .ok_or_else(|| Error::ObjectNotFound(format!("profile {}", id)))
}

#[async_trait]
impl ProfileSource for RemoteBackend {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let row = retry(|| self.client.profile(user_id)).await.map_err(remote_error)?;
        Ok(row.map(profile_from_row))
    }

    async fn profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>> {
        let rows = retry(|| self.client.profiles(user_ids)).await.map_err(remote_error)?;
        Ok(rows.into_iter().map(profile_from_row).collect())
    }

    async fn profile_by_username(&self, username: &str) -> Result<Option<Profile>> {
        let params = build_params! {
            required select => PROFILE_COLUMNS,
            filter username => ("eq", username),
            required limit => 1,
        };
        let rows = retry(|| self.client.select::<ProfileRow>("profiles", params.clone()))
            .await
            .map_err(remote_error)?;
        Ok(rows.into_iter().next().map(profile_from_row))
    }

    async fn search_profiles(&self, pattern: Option<&str>, limit: u64) -> Result<Vec<Profile>> {
        let params = profile_search_params(pattern, limit);
        let rows = retry(|| self.client.select::<ProfileRow>("profiles", params.clone()))
            .await
            .map_err(remote_error)?;
        Ok(rows.into_iter().map(profile_from_row).collect())
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<Profile> {
        let rows = self
            .client
            .insert::<_, ProfileRow>("profiles", &new_profile(profile), PROFILE_COLUMNS)
            .await
            .map_err(remote_error)?;
        first_profile(rows, &profile.id)
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile> {
        let rows = self
            .client
            .upsert::<_, ProfileRow>("profiles", &new_profile(profile), "id", PROFILE_COLUMNS)
            .await
            .map_err(remote_error)?;
        first_profile(rows, &profile.id)
    }
}

/// Profiles with a username, matching `pattern` on username or display name, or else the newest.
pub fn profile_search_params(pattern: Option<&str>, limit: u64) -> Params {
    let or = pattern.map(|p| format!("(username.ilike.*{p}*,display_name.ilike.*{p}*)"));
    let order = pattern.is_none().then_some("created_at.desc");
    build_params! {
        required select => PROFILE_COLUMNS,
        optional or,
        filter username => ("not.is", "null"),
        optional order,
        required limit,
    }
}

// MARK: Helpers

/// Unique violations surface as `ObjectAlreadyExists` so callers can pick another name.
pub fn remote_error(e: ClientError) -> Error {
    match e {
        ClientError::ApiError { status, code, message } if status == 409 || code.as_deref() == Some("23505") => {
            Error::ObjectAlreadyExists(message)
        }
        ClientError::ApiError {
            status: 401, message, ..
        } => Error::NotLoggedIn(message),
        ClientError::ApiError { message, .. } => Error::Remote(message),
        ClientError::NetworkError(e) if e.is_timeout() => Error::Timeout(e.to_string()),
        ClientError::JSONError(e) => Error::JSONError(e),
        e => Error::Other(e.into()),
    }
}

/// Retry reads that failed for transient reasons, like a gateway timeout.
fn retry<R, T, F>(f: F) -> impl Future<Output = std::result::Result<R, ClientError>>
where
    T: Future<Output = std::result::Result<R, ClientError>>,
    F: FnMut() -> T,
{
    use tokio_retry::{strategy::FixedInterval, RetryIf};
    let strategy = FixedInterval::from_millis(RETRY_DELAY_MS).take(RETRY_COUNT);
    RetryIf::spawn(strategy, f, |e: &ClientError| e.transient())
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};
    use rhythm_core::query::{FeedFilter, SortOrder, TimeWindow};

    use super::*;

    fn params_map(params: &Params) -> HashMap<&str, &str> {
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn test_default_params() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let query = PostQuery::build(ContentKind::Song, &FeedFilter::default(), false, now, 0, 10);
        let params = post_params(&query);
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("type".to_string(), "eq.song".to_string()),
                ("status".to_string(), "eq.approved".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
            ]
        );
    }

    #[test]
    fn test_filtered_params() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let filter = FeedFilter {
            search: "rain".to_string(),
            window: TimeWindow::Day,
            sort: SortOrder::Az,
            tag: Some("sad".to_string()),
            ..Default::default()
        };
        let query = PostQuery::build(ContentKind::Poem, &filter, true, now, 20, 10);
        let params = post_params(&query);
        let map = params_map(&params);
        assert_eq!(map["or"], "(title.ilike.*rain*,body_text.ilike.*rain*)");
        assert_eq!(map["created_at"], "gte.2024-06-14T12:00:00Z");
        assert_eq!(map["tags"], "cs.{sad}");
        assert_eq!(map["order"], "title.asc,created_at.desc");

        let map_without = post_params(&query.without_tag());
        assert!(!params_map(&map_without).contains_key("tags"));
    }

    #[test]
    fn test_post_from_row() {
        let row: PostRow = serde_json::from_str(
            r#"{"id": 7, "type": "image", "title": " ", "image_url": "https://cdn/x.png",
                "created_at": "2024-05-01T08:00:00Z"}"#,
        )
        .unwrap();
        let post = post_from_row(row, ContentKind::Poem);
        assert_eq!(post.id, "7");
        assert_eq!(post.kind, ContentKind::Image);
        assert_eq!(post.title, "Untitled");
        assert!(post.tags.is_empty());
        assert!(!post.has_body());
    }

    #[test]
    fn test_profile_search_params() {
        let params = profile_search_params(Some("ann"), 18);
        let map = params_map(&params);
        assert_eq!(map["or"], "(username.ilike.*ann*,display_name.ilike.*ann*)");
        assert_eq!(map["username"], "not.is.null");
        assert_eq!(map["limit"], "18");
        assert!(!map.contains_key("order"));

        let params = profile_search_params(None, 24);
        let map = params_map(&params);
        assert_eq!(map["order"], "created_at.desc");
        assert!(!map.contains_key("or"));
    }

    #[test]
    fn test_own_post_row_keeps_status() {
        let row: PostRow = serde_json::from_str(
            r#"{"id": 3, "type": "poem", "title": "Draft", "status": "pending",
                "created_at": "2024-05-01T08:00:00Z", "user_id": "u1"}"#,
        )
        .unwrap();
        let post = typed_post(row).unwrap();
        assert_eq!(post.status, PostStatus::Pending);

        let untyped: PostRow = serde_json::from_str(r#"{"id": 4, "created_at": "2024-05-01T08:00:00Z"}"#).unwrap();
        assert!(typed_post(untyped).is_none());
    }

    #[test]
    fn test_remote_error_mapping() {
        let conflict = ClientError::ApiError {
            status: 409,
            code: Some("23505".to_string()),
            message: "duplicate key value violates unique constraint".to_string(),
        };
        assert!(matches!(remote_error(conflict), Error::ObjectAlreadyExists(_)));

        let rejected = ClientError::ApiError {
            status: 400,
            code: Some("42703".to_string()),
            message: "column posts.tags does not exist".to_string(),
        };
        let err = remote_error(rejected);
        assert_eq!(err.to_string(), "column posts.tags does not exist");

        let anonymous = ClientError::ApiError {
            status: 401,
            code: None,
            message: "invalid JWT".to_string(),
        };
        assert!(matches!(remote_error(anonymous), Error::NotLoggedIn(_)));
    }
}
