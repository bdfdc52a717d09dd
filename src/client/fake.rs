//! In-memory `PublicationApi` for synchronizer tests.
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    ClickRecord, EmailStats, ListPostsResponse, PostStatus, PublicationApi, RemotePost,
    RemotePostStats,
};
use crate::error::{Error, Result};

pub(crate) enum StatsReply {
    Stats(EmailStats, Vec<ClickRecord>),
    NoEnvelope,
    NotFound,
    Fail,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    /// Newest first, the order the real API returns them in.
    posts: Vec<RemotePost>,
    stats: HashMap<String, StatsReply>,
    failing_pages: HashSet<u32>,
    omit_page_count: bool,
    pub pages_requested: Mutex<Vec<u32>>,
    pub stats_requested: Mutex<Vec<String>>,
}

pub(crate) fn remote_post(id: &str, status: PostStatus, publish_date: Option<i64>) -> RemotePost {
    RemotePost {
        id: id.to_string(),
        title: format!("Title {id}"),
        subtitle: None,
        status,
        publish_date,
        web_url: Some(format!("https://example.com/p/{id}")),
        stats: None,
    }
}

/// `count` confirmed posts, newest first, ids `post_{count-1}` down to `post_0`.
pub(crate) fn numbered_posts(count: usize) -> Vec<RemotePost> {
    (0..count)
        .rev()
        .map(|i| {
            remote_post(
                &format!("post_{i}"),
                PostStatus::Confirmed,
                Some(1_735_689_600 + i as i64 * 86_400),
            )
        })
        .collect()
}

impl FakeApi {
    pub fn new(posts: Vec<RemotePost>) -> Self {
        Self {
            posts,
            ..Default::default()
        }
    }

    pub fn with_stats(mut self, post_id: &str, email: EmailStats) -> Self {
        self.stats
            .insert(post_id.to_string(), StatsReply::Stats(email, Vec::new()));
        self
    }

    pub fn with_reply(mut self, post_id: &str, reply: StatsReply) -> Self {
        self.stats.insert(post_id.to_string(), reply);
        self
    }

    pub fn failing_page(mut self, page: u32) -> Self {
        self.failing_pages.insert(page);
        self
    }

    /// Leave `total_pages` out of every list response.
    pub fn without_page_count(mut self) -> Self {
        self.omit_page_count = true;
        self
    }

    pub fn pages_requested(&self) -> Vec<u32> {
        self.pages_requested.lock().unwrap().clone()
    }

    pub fn stats_requested(&self) -> Vec<String> {
        self.stats_requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PublicationApi for FakeApi {
    async fn list_posts(
        &self,
        _publication_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<ListPostsResponse> {
        self.pages_requested.lock().unwrap().push(page);
        if self.failing_pages.contains(&page) {
            return Err(Error::RemoteFailure(format!("page {page} exploded")));
        }
        let limit = limit.max(1) as usize;
        let total = self.posts.len();
        let total_pages = total.div_ceil(limit) as u32;
        let start = (page.saturating_sub(1) as usize) * limit;
        let data = self
            .posts
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect();
        Ok(ListPostsResponse {
            data,
            page: Some(page),
            total_pages: (!self.omit_page_count).then_some(total_pages),
            total_results: total as u64,
        })
    }

    async fn get_post_with_stats(&self, _publication_id: &str, post_id: &str) -> Result<RemotePost> {
        self.stats_requested
            .lock()
            .unwrap()
            .push(post_id.to_string());
        let mut post = self
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .cloned()
            .ok_or_else(|| Error::RemoteNotFound(post_id.to_string()))?;
        match self.stats.get(post_id) {
            Some(StatsReply::Stats(email, clicks)) => {
                post.stats = Some(RemotePostStats {
                    email: Some(*email),
                    clicks: clicks.clone(),
                });
            }
            Some(StatsReply::NoEnvelope) => post.stats = Some(RemotePostStats::default()),
            Some(StatsReply::NotFound) => return Err(Error::RemoteNotFound(post_id.to_string())),
            Some(StatsReply::Fail) => {
                return Err(Error::RemoteFailure(format!("stats for {post_id} exploded")))
            }
            None => post.stats = None,
        }
        Ok(post)
    }
}
