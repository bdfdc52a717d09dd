use serde::{Deserialize, Serialize};

/// One page of the "list posts" endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ListPostsResponse {
    #[serde(default)]
    pub data: Vec<RemotePost>,
    #[serde(default)]
    pub page: Option<u32>,
    /// Absent on some API versions; pagination then runs until a short page.
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub total_results: u64,
}

/// Envelope of the "get post" endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GetPostResponse {
    pub data: RemotePost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Confirmed,
    Sent,
    Scheduled,
    Archived,
    #[serde(other)]
    Other,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Confirmed => "confirmed",
            PostStatus::Sent => "sent",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Archived => "archived",
            PostStatus::Other => "other",
        }
    }
}

/// A post as returned by the publication API.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePost {
    /// Stable remote identifier, the natural key for upserts.
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub status: PostStatus,
    /// Unix seconds; absent for unpublished drafts.
    #[serde(default)]
    pub publish_date: Option<i64>,
    #[serde(default)]
    pub web_url: Option<String>,
    /// Only present when the request asked for `expand[]=stats`.
    #[serde(default)]
    pub stats: Option<RemotePostStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemotePostStats {
    /// Missing for very recent posts whose stats are not computed yet.
    #[serde(default)]
    pub email: Option<EmailStats>,
    #[serde(default)]
    pub clicks: Vec<ClickRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct EmailStats {
    #[serde(default)]
    pub recipients: u64,
    #[serde(default)]
    pub delivered: u64,
    #[serde(default)]
    pub opens: u64,
    #[serde(default)]
    pub unique_opens: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub unique_clicks: u64,
    #[serde(default)]
    pub unsubscribes: u64,
    #[serde(default)]
    pub spam_reports: u64,
}

/// Clicks on one URL inside a post. Stored verbatim as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickRecord {
    pub url: String,
    #[serde(default)]
    pub total_clicks: u64,
    #[serde(default)]
    pub total_unique_clicks: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<ClickCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickCounts {
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub unique_clicks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_posts_payload() {
        let raw = r#"{
            "data": [
                {"id": "post_1", "title": "Hello", "status": "confirmed", "publish_date": 1735689600},
                {"id": "post_2", "title": "Draft", "status": "draft", "publish_date": null},
                {"id": "post_3", "status": "some_new_status"}
            ],
            "page": 1,
            "limit": 50,
            "total_pages": 3,
            "total_results": 120
        }"#;
        let resp: ListPostsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.data.len(), 3);
        assert_eq!(resp.total_pages, Some(3));
        assert_eq!(resp.total_results, 120);
        assert_eq!(resp.data[0].status, PostStatus::Confirmed);
        assert_eq!(resp.data[0].publish_date, Some(1_735_689_600));
        assert_eq!(resp.data[1].publish_date, None);
        assert_eq!(resp.data[2].status, PostStatus::Other);
        assert_eq!(resp.data[2].title, "");
        assert!(resp.data[0].stats.is_none());
    }

    #[test]
    fn test_list_posts_without_page_count() {
        let resp: ListPostsResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert_eq!(resp.total_pages, None);
        assert_eq!(resp.total_results, 0);
    }

    #[test]
    fn test_post_without_id_is_rejected() {
        let raw = r#"{"data": {"title": "no id", "status": "confirmed"}}"#;
        assert!(serde_json::from_str::<GetPostResponse>(raw).is_err());
    }

    #[test]
    fn test_expanded_stats_payload() {
        let raw = r#"{"data": {
            "id": "post_1", "title": "Hello", "status": "confirmed", "publish_date": 1735689600,
            "stats": {
                "email": {"recipients": 1000, "delivered": 950, "opens": 420, "unique_opens": 300,
                          "clicks": 80, "unique_clicks": 60, "unsubscribes": 5, "spam_reports": 1},
                "clicks": [{"url": "https://example.com", "total_clicks": 80, "total_unique_clicks": 60,
                            "email": {"clicks": 80, "unique_clicks": 60, "click_through_rate": 20.0}}]
            }
        }}"#;
        let resp: GetPostResponse = serde_json::from_str(raw).unwrap();
        let stats = resp.data.stats.unwrap();
        let email = stats.email.unwrap();
        assert_eq!(email.recipients, 1000);
        assert_eq!(email.unique_clicks, 60);
        assert_eq!(stats.clicks.len(), 1);
        assert_eq!(stats.clicks[0].email.as_ref().unwrap().unique_clicks, 60);
    }

    #[test]
    fn test_stats_without_email_envelope() {
        let raw = r#"{"data": {"id": "post_9", "status": "confirmed", "stats": {}}}"#;
        let resp: GetPostResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.data.stats.unwrap().email.is_none());
    }
}
