pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

pub use types::*;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::sync::rate_limit::{with_retry, RetryPolicy};

/// Page size used when listing posts.
pub const PAGE_SIZE: u32 = 50;

/// The remote newsletter API, as seen by the synchronizers.
#[async_trait]
pub trait PublicationApi: Send + Sync {
    /// One page of posts, newest first. Pages are 1-based.
    async fn list_posts(
        &self,
        publication_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<ListPostsResponse>;

    /// A single post with its stats envelope expanded.
    async fn get_post_with_stats(&self, publication_id: &str, post_id: &str) -> Result<RemotePost>;
}

/// `reqwest`-backed client for the beehiiv v2 API.
#[derive(Clone)]
pub struct BeehiivClient {
    http: reqwest::Client,
    config: ApiConfig,
    policy: RetryPolicy,
}

impl std::fmt::Debug for BeehiivClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeehiivClient")
            .field("base_url", &self.config.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl BeehiivClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("newsletterdw/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        let policy = RetryPolicy::new(config.max_retries, config.base_delay);
        Ok(Self {
            http,
            config,
            policy,
        })
    }

    /// Build a client from `BEEHIIV_API_KEY` and friends.
    pub fn from_env() -> Result<Self> {
        Self::new(ApiConfig::from_env()?)
    }

    fn resource_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .config
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("invalid resource path {path}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET a resource with 429 retry and per-call throttling.
    pub async fn fetch_resource(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = self.resource_url(path, query)?;
        with_retry(&self.policy, path, || self.get_once(&url)).await
    }

    async fn get_once(&self, url: &Url) -> Result<Value> {
        log::debug!("GET {}", url.path());
        let res = self
            .http
            .get(url.clone())
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            return Ok(res.json::<Value>().await?);
        }
        let body = res.text().await.unwrap_or_default();
        Err(status_error(status, url.path(), &body)
            .unwrap_or_else(|| Error::RemoteFailure(format!("{} returned {status}", url.path()))))
    }
}

/// Map a non-success status to the error the sync layer acts on: 429 is
/// retried, 404 skips the item, everything else fails it.
fn status_error(status: StatusCode, path: &str, body: &str) -> Option<Error> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RemoteThrottled(path.to_string()),
        StatusCode::NOT_FOUND => Error::RemoteNotFound(path.to_string()),
        _ => Error::RemoteFailure(format!("{path} returned {status}: {}", truncate(body, 300))),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl PublicationApi for BeehiivClient {
    async fn list_posts(
        &self,
        publication_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<ListPostsResponse> {
        let path = format!("publications/{publication_id}/posts");
        let page = page.to_string();
        let limit = limit.to_string();
        let query = [
            ("page", page.as_str()),
            ("limit", limit.as_str()),
            ("status", "all"),
            ("order_by", "created"),
            ("direction", "desc"),
        ];
        let value = self.fetch_resource(&path, &query).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_post_with_stats(&self, publication_id: &str, post_id: &str) -> Result<RemotePost> {
        let path = format!("publications/{publication_id}/posts/{post_id}");
        let value = self.fetch_resource(&path, &[("expand[]", "stats")]).await?;
        let resp: GetPostResponse = serde_json::from_value(value)?;
        Ok(resp.data)
    }
}
