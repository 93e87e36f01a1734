//! Instagram Graph API feed for the storefront.
//!
//! Feed failures are logged and surface as an empty list so the home page
//! never fails because of Instagram.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::config::InstagramConfig;
use crate::error::{EcommerceError, Result};

pub const DEFAULT_POST_LIMIT: usize = 9;
pub const MAX_POST_LIMIT: usize = 25;
const ACCOUNT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const MEDIA_FIELDS: &str =
    "id,caption,media_type,media_url,permalink,thumbnail_url,timestamp,children{media_url,thumbnail_url}";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Image,
    Video,
    Carousel,
}

#[derive(Clone, Debug, Serialize)]
pub struct InstagramPost {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PostKind,
    pub url: String,
    pub thumbnail: Option<String>,
    pub permalink: String,
    pub caption: String,
    pub timestamp: String,
    pub has_multiple: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccountInfo {
    pub id: String,
    pub username: Option<String>,
    pub account_type: Option<String>,
}

#[derive(Deserialize)]
struct MediaPage {
    #[serde(default)]
    data: Vec<Media>,
}

#[derive(Deserialize)]
struct Media {
    id: String,
    media_type: String,
    media_url: Option<String>,
    thumbnail_url: Option<String>,
    permalink: Option<String>,
    caption: Option<String>,
    timestamp: Option<String>,
    children: Option<Children>,
}

#[derive(Deserialize)]
struct Children {
    #[serde(default)]
    data: Vec<Child>,
}

#[derive(Deserialize)]
struct Child {
    media_url: Option<String>,
    thumbnail_url: Option<String>,
}

impl Media {
    fn into_post(self) -> Option<InstagramPost> {
        let media_url = self.media_url?;
        let (kind, url, thumbnail) = match self.media_type.as_str() {
            "IMAGE" => (PostKind::Image, media_url, None),
            "VIDEO" => {
                let thumbnail = self.thumbnail_url.unwrap_or_else(|| media_url.clone());
                (PostKind::Video, media_url, Some(thumbnail))
            }
            "CAROUSEL_ALBUM" => {
                let first = self.children.and_then(|c| c.data.into_iter().next());
                match first.and_then(|c| c.media_url.map(|url| (c.thumbnail_url, url))) {
                    Some((thumb, url)) => {
                        let thumbnail = thumb.unwrap_or_else(|| url.clone());
                        (PostKind::Carousel, url, Some(thumbnail))
                    }
                    None => (PostKind::Carousel, media_url.clone(), Some(media_url)),
                }
            }
            _ => return None,
        };
        Some(InstagramPost {
            id: self.id,
            kind,
            url,
            thumbnail,
            permalink: self.permalink.unwrap_or_default(),
            caption: self.caption.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or_default(),
            has_multiple: kind == PostKind::Carousel,
        })
    }
}

struct Cached<T> {
    stored_at: Instant,
    value: T,
}

impl<T: Clone> Cached<T> {
    fn fresh(&self, ttl: Duration) -> Option<T> {
        (self.stored_at.elapsed() < ttl).then(|| self.value.clone())
    }
}

#[derive(Default)]
struct FeedCache {
    posts: HashMap<usize, Cached<Vec<InstagramPost>>>,
    account: Option<Cached<AccountInfo>>,
}

#[derive(Clone)]
pub struct InstagramClient {
    http: Client,
    api_url: String,
    user_id: String,
    cache_ttl: Duration,
    token: Arc<RwLock<String>>,
    cache: Arc<RwLock<FeedCache>>,
}

impl InstagramClient {
    pub fn new(config: &InstagramConfig) -> Self {
        Self {
            http: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            user_id: config.user_id.clone(),
            cache_ttl: Duration::from_secs(config.cache_minutes * 60),
            token: Arc::new(RwLock::new(config.access_token.clone())),
            cache: Arc::new(RwLock::new(FeedCache::default())),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.user_id.is_empty()
    }

    /// Latest posts, newest first. `limit` is clamped to 1..=25.
    pub async fn recent_posts(&self, limit: Option<usize>) -> Vec<InstagramPost> {
        let limit = limit.unwrap_or(DEFAULT_POST_LIMIT).clamp(1, MAX_POST_LIMIT);
        if !self.is_configured() {
            return vec![];
        }
        if let Some(posts) = self.cache.read().await.posts.get(&limit).and_then(|c| c.fresh(self.cache_ttl)) {
            return posts;
        }
        match self.fetch_posts(limit).await {
            Ok(posts) => {
                self.cache
                    .write()
                    .await
                    .posts
                    .insert(limit, Cached { stored_at: Instant::now(), value: posts.clone() });
                posts
            }
            Err(e) => {
                error!(error = %e, limit, "failed to load instagram posts");
                vec![]
            }
        }
    }

    async fn fetch_posts(&self, limit: usize) -> Result<Vec<InstagramPost>> {
        let token = self.token.read().await.clone();
        let limit = limit.to_string();
        let response = self
            .http
            .get(format!("{}/{}/media", self.api_url, self.user_id))
            .query(&[("fields", MEDIA_FIELDS), ("access_token", token.as_str()), ("limit", limit.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EcommerceError::Gateway(format!("instagram responded {}", response.status())));
        }
        let page: MediaPage = response.json().await?;
        Ok(page.data.into_iter().filter_map(Media::into_post).collect())
    }

    /// The connected account, cached for a day. `None` when the API is unreachable.
    pub async fn account_info(&self) -> Option<AccountInfo> {
        if let Some(info) = self.cache.read().await.account.as_ref().and_then(|c| c.fresh(ACCOUNT_TTL)) {
            return Some(info);
        }
        let token = self.token.read().await.clone();
        let fetched: Result<AccountInfo> = async {
            let response = self
                .http
                .get(format!("{}/me", self.api_url))
                .query(&[("fields", "id,username,account_type"), ("access_token", token.as_str())])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(EcommerceError::Gateway(format!("instagram responded {}", response.status())));
            }
            Ok(response.json().await?)
        }
        .await;
        match fetched {
            Ok(info) => {
                self.cache.write().await.account = Some(Cached { stored_at: Instant::now(), value: info.clone() });
                Some(info)
            }
            Err(e) => {
                error!(error = %e, "failed to load instagram account info");
                None
            }
        }
    }

    pub async fn validate_token(&self) -> bool {
        #[derive(Deserialize)]
        struct DebugToken {
            data: Option<DebugData>,
        }
        #[derive(Deserialize)]
        struct DebugData {
            is_valid: Option<bool>,
        }

        let token = self.token.read().await.clone();
        let response = self
            .http
            .get(format!("{}/debug_token", self.api_url))
            .query(&[("input_token", token.as_str()), ("access_token", token.as_str())])
            .send()
            .await;
        match response {
            Ok(r) if r.status().is_success() => r
                .json::<DebugToken>()
                .await
                .ok()
                .and_then(|d| d.data)
                .and_then(|d| d.is_valid)
                .unwrap_or(false),
            Ok(_) => false,
            Err(e) => {
                error!(error = %e, "failed to validate instagram token");
                false
            }
        }
    }

    /// Exchanges the long-lived token for a fresh one and keeps it in memory.
    pub async fn refresh_token(&self) -> bool {
        #[derive(Deserialize)]
        struct Refreshed {
            access_token: Option<String>,
            expires_in: Option<u64>,
        }

        let token = self.token.read().await.clone();
        let response = self
            .http
            .get(format!("{}/refresh_access_token", self.api_url))
            .query(&[("grant_type", "ig_refresh_token"), ("access_token", token.as_str())])
            .send()
            .await;
        let refreshed = match response {
            Ok(r) if r.status().is_success() => r.json::<Refreshed>().await.ok(),
            Ok(r) => {
                error!(status = %r.status(), "instagram token refresh rejected");
                None
            }
            Err(e) => {
                error!(error = %e, "failed to refresh instagram token");
                None
            }
        };
        match refreshed.and_then(|r| r.access_token.map(|t| (t, r.expires_in))) {
            Some((new_token, expires_in)) => {
                *self.token.write().await = new_token;
                info!(expires_in = ?expires_in, "instagram token refreshed");
                true
            }
            None => false,
        }
    }

    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        cache.posts.clear();
        cache.account = None;
        info!("instagram cache cleared");
    }
}
