mod error;
mod result;

use reqwest::{header, Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use rhythm_util::{build_params, parsing::parse_content_range};

pub use crate::error::Error;
use crate::error::Result;
pub use crate::result::*;

pub type Params = Vec<(String, String)>;

/// Client of the hosted backend's REST interface (PostgREST dialect).
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: Url,
    auth_url: Url,
    api_key: String,
}

impl RestClient {
    /// Anonymous client. Row level security decides what it can see.
    pub fn new(base_url: &str, api_key: &str) -> Result<RestClient> {
        Self::build(base_url, api_key, api_key)
    }

    /// Client acting as a signed-in user.
    pub fn with_access_token(&self, access_token: &str) -> Result<RestClient> {
        let root = self.base_url.join("../..")?;
        Self::build(root.as_str(), &self.api_key, access_token)
    }

    fn build(base_url: &str, api_key: &str, bearer: &str) -> Result<RestClient> {
        let mut headers = header::HeaderMap::new();
        headers.insert("apikey", header::HeaderValue::from_str(api_key)?);
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", bearer))?,
        );
        let client = Client::builder().default_headers(headers).build()?;
        let mut root = Url::parse(base_url)?;
        if !root.path().ends_with('/') {
            root.set_path(&format!("{}/", root.path()));
        }
        Ok(RestClient {
            client,
            base_url: root.join("rest/v1/")?,
            auth_url: root.join("auth/v1/")?,
            api_key: api_key.to_string(),
        })
    }

    // MARK: Generic table access

    pub async fn select<T: DeserializeOwned>(&self, table: &str, params: Params) -> Result<Vec<T>> {
        let request = self.request(Method::GET, table, &params)?;
        let content = Self::send(request, table).await?.text().await?;
        log(table, &content).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Select a window of rows and ask the backend for the exact total.
    pub async fn select_page<T: DeserializeOwned>(
        &self,
        table: &str,
        mut params: Params,
        offset: u64,
        limit: u64,
    ) -> Result<Page<T>> {
        params.extend(build_params! { required offset, required limit });
        let request = self
            .request(Method::GET, table, &params)?
            .header("Prefer", "count=exact");
        let response = Self::send(request, table).await?;
        let total = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map(parse_content_range)
            .transpose()?
            .and_then(|range| range.total);
        let content = response.text().await?;
        log(table, &content).await?;
        let rows = serde_json::from_str(&content)?;
        Ok(Page { rows, total })
    }

    /// Insert rows and return them as stored, restricted to the `select` columns.
    pub async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
        select: &str,
    ) -> Result<Vec<T>> {
        let params = build_params! { required select };
        let request = self
            .request(Method::POST, table, &params)?
            .header("Prefer", "return=representation")
            .json(body);
        let content = Self::send(request, table).await?.text().await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Insert or merge on the `on_conflict` column.
    pub async fn upsert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
        on_conflict: &str,
        select: &str,
    ) -> Result<Vec<T>> {
        let params = build_params! { required on_conflict, required select };
        let request = self
            .request(Method::POST, table, &params)?
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .json(body);
        let content = Self::send(request, table).await?.text().await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Delete all rows matching the filters in `params`.
    pub async fn delete(&self, table: &str, params: Params) -> Result<()> {
        let request = self.request(Method::DELETE, table, &params)?;
        Self::send(request, table).await?;
        Ok(())
    }

    /// Delete all rows matching the filters in `params` and return them, restricted to `select`.
    /// Rows hidden by row level security are neither deleted nor returned.
    pub async fn delete_returning<T: DeserializeOwned>(&self, table: &str, mut params: Params, select: &str) -> Result<Vec<T>> {
        params.extend(build_params! { required select });
        let request = self
            .request(Method::DELETE, table, &params)?
            .header("Prefer", "return=representation");
        let content = Self::send(request, table).await?.text().await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrite the columns present in `body` on all rows matching `params`, and return them.
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        mut params: Params,
        body: &B,
        select: &str,
    ) -> Result<Vec<T>> {
        params.extend(build_params! { required select });
        let request = self
            .request(Method::PATCH, table, &params)?
            .header("Prefer", "return=representation")
            .json(body);
        let content = Self::send(request, table).await?.text().await?;
        Ok(serde_json::from_str(&content)?)
    }

    // MARK: Typed endpoints

    /// One approved post. Pending and hidden posts are never returned, whatever row level security allows.
    pub async fn post(&self, id: &str, select: &str) -> Result<Option<PostRow>> {
        let params = approved_post_params(id, select);
        Ok(self.select::<PostRow>("posts", params).await?.into_iter().next())
    }

    /// One post owned by `user_id`, in any status.
    pub async fn own_post(&self, id: &str, user_id: &str, select: &str) -> Result<Option<PostRow>> {
        let params = build_params! {
            required select,
            filter id => ("eq", id),
            filter user_id => ("eq", user_id),
            required limit => 1,
        };
        Ok(self.select::<PostRow>("posts", params).await?.into_iter().next())
    }

    pub async fn profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        let params = build_params! {
            required select => PROFILE_COLUMNS,
            filter id => ("eq", user_id),
            required limit => 1,
        };
        Ok(self.select::<ProfileRow>("profiles", params).await?.into_iter().next())
    }

    pub async fn profiles(&self, user_ids: &[String]) -> Result<Vec<ProfileRow>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }
        let params = build_params! {
            required select => PROFILE_COLUMNS,
            any_of id => user_ids,
        };
        self.select("profiles", params).await
    }

    pub async fn counts(&self, view: &str, column: &str, post_ids: &[String]) -> Result<Vec<CountRow>> {
        let params = build_params! {
            required select => format!("post_id,{}", column),
            any_of post_id => post_ids,
        };
        self.select(view, params).await
    }

    pub async fn reactions(&self, table: ReactionTable, user_id: &str, post_ids: &[String]) -> Result<Vec<ReactionRow>> {
        let params = build_params! {
            required select => "id,post_id",
            filter user_id => ("eq", user_id),
            any_of post_id => post_ids,
        };
        self.select(table.table(), params).await
    }

    pub async fn comments(&self, post_id: &str, limit: u32) -> Result<Vec<CommentRow>> {
        let params = build_params! {
            required select => "id,body,created_at,user_id",
            filter post_id => ("eq", post_id),
            required order => "created_at.desc",
            required limit,
        };
        self.select("post_comments", params).await
    }

    /// The user owning the bearer token. Fails with status 401 for the anonymous key.
    pub async fn user(&self) -> Result<UserRow> {
        let url = self.auth_url.join("user")?;
        tracing::debug!("GET {}", url);
        let request = self.client.get(url);
        let content = Self::send(request, "user").await?.text().await?;
        Ok(serde_json::from_str(&content)?)
    }

    // MARK: Internals

    fn request(&self, method: Method, table: &str, params: &Params) -> Result<RequestBuilder> {
        let url = Url::parse_with_params(self.base_url.join(table)?.as_str(), params)?;
        tracing::debug!("{} {}", method, url);
        Ok(self.client.request(method, url))
    }

    async fn send(request: RequestBuilder, table: &str) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let content = response.text().await?;
        log(&format!("{}_error", table), &content).await?;
        let (code, message) = match serde_json::from_str::<APIErrorBody>(&content) {
            Ok(body) => (body.code, body.message),
            Err(_) => (None, status.canonical_reason().unwrap_or("request failed").to_string()),
        };
        Err(Error::ApiError {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

fn approved_post_params(id: &str, select: &str) -> Params {
    build_params! {
        required select,
        filter id => ("eq", id),
        filter status => ("eq", "approved"),
        required limit => 1,
    }
}


pub const PROFILE_COLUMNS: &str = "id,username,display_name,bio,website,avatar_url";
pub const POST_COLUMNS: &str = "id,type,title,body_text,song_url,image_url,status,created_at,user_id";

async fn log(name: &str, content: &str) -> Result<()> {
    use std::path::PathBuf;
    use tokio::{fs::File, io::AsyncWriteExt};

    if let Ok(dir) = std::env::var("CLIENT_LOG_DIR") {
        let time = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let filepath = PathBuf::from(dir).join(format!("rest_{}_{}.json", name, time));
        let mut file = File::create(filepath).await?;
        file.write_all(content.as_bytes()).await?;
    }
    Ok(())
}
