use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub const PUBLIC_BASE_URL: &str = "https://www.reddit.com/";
pub const OAUTH_BASE_URL: &str = "https://oauth.reddit.com/";
pub const PAGE_SIZE: u32 = 25;

pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Result<OAuthToken>;
}

#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("reddit: unauthorized")]
    Unauthorized,
    #[error("reddit: rate limited: {0}")]
    RateLimited(String),
    #[error("reddit: api error {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub public_base_url: Option<String>,
    pub oauth_base_url: Option<String>,
    pub page_size: Option<u32>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOption {
    #[default]
    Hot,
    New,
    Top,
    Rising,
}

impl SortOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOption::Hot => "hot",
            SortOption::New => "new",
            SortOption::Top => "top",
            SortOption::Rising => "rising",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    public_base: Url,
    oauth_base: Url,
    page_size: u32,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("reddit client user agent required");
        }
        let public_base = Url::parse(
            config
                .public_base_url
                .as_deref()
                .unwrap_or(PUBLIC_BASE_URL),
        )
        .context("reddit: parse public base url")?;
        let oauth_base = Url::parse(config.oauth_base_url.as_deref().unwrap_or(OAUTH_BASE_URL))
            .context("reddit: parse oauth base url")?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .context("reddit: build http client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            public_base,
            oauth_base,
            page_size: config.page_size.filter(|size| *size > 0).unwrap_or(PAGE_SIZE),
        })
    }

    /// The global `r/popular` listing. No authentication involved.
    pub fn popular(
        &self,
        sort: SortOption,
        time: TimeFilter,
        after: Option<&str>,
    ) -> Result<Listing<Post>> {
        self.subreddit("popular", sort, time, after)
    }

    pub fn subreddit(
        &self,
        name: &str,
        sort: SortOption,
        time: TimeFilter,
        after: Option<&str>,
    ) -> Result<Listing<Post>> {
        let name = name.trim().trim_start_matches("r/").trim_matches('/');
        if name.is_empty() {
            bail!("reddit: subreddit name required");
        }
        let path = format!("r/{}/{}.json", name, sort.as_str());
        let mut params = vec![
            ("sort".to_string(), sort.as_str().to_string()),
            ("t".to_string(), time.as_str().to_string()),
        ];
        params.extend(self.page_params(after));
        let url = build_url(&self.public_base, &path, &params)?;
        self.fetch_listing(url, None)
    }

    /// The signed-in user's front page. Requires a bearer token.
    pub fn home(
        &self,
        access_token: &str,
        sort: SortOption,
        after: Option<&str>,
    ) -> Result<Listing<Post>> {
        if access_token.trim().is_empty() {
            bail!(ApiError::Unauthorized);
        }
        let params = self.page_params(after);
        let url = build_url(&self.oauth_base, sort.as_str(), &params)?;
        self.fetch_listing(url, Some(access_token))
    }

    fn page_params(&self, after: Option<&str>) -> Vec<(String, String)> {
        let mut params = vec![
            ("limit".to_string(), self.page_size.to_string()),
            ("raw_json".to_string(), "1".to_string()),
        ];
        if let Some(after) = after.filter(|cursor| !cursor.trim().is_empty()) {
            params.push(("after".to_string(), after.to_string()));
        }
        params
    }

    fn fetch_listing<T>(&self, url: Url, bearer: Option<&str>) -> Result<Listing<T>>
    where
        T: DeserializeOwned,
    {
        let resp = self.request(url, bearer)?;
        let listing: ListingEnvelope<T> = resp.json().context("reddit: decode listing")?;
        Ok(listing.data)
    }

    fn request(&self, url: Url, bearer: Option<&str>) -> Result<Response> {
        debug!(%url, authenticated = bearer.is_some(), "reddit request");
        let mut req = self
            .http
            .get(url.clone())
            .header(USER_AGENT, self.user_agent.clone());
        if let Some(token) = bearer {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let resp = req
            .send()
            .with_context(|| format!("reddit: request {}", url.path()))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        let err = match status.as_u16() {
            401 => ApiError::Unauthorized,
            429 => ApiError::RateLimited(body),
            code => ApiError::Status { status: code, body },
        };
        Err(err.into())
    }
}

fn build_url(base: &Url, path: &str, params: &[(String, String)]) -> Result<Url> {
    let mut url = base
        .join(path)
        .with_context(|| format!("reddit: build url for {path}"))?;
    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in params {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

pub fn permalink_url(permalink: &str) -> String {
    if permalink.starts_with("http://") || permalink.starts_with("https://") {
        return permalink.to_string();
    }
    format!("https://www.reddit.com{}", permalink)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default = "Vec::new")]
    pub children: Vec<Thing<T>>,
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        self.children.into_iter().map(|thing| thing.data).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing<T> {
    #[serde(default)]
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub subreddit_name_prefixed: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub post_hint: Option<String>,
    #[serde(default)]
    pub media: Option<PostMedia>,
    #[serde(default)]
    pub secure_media: Option<PostMedia>,
    #[serde(default)]
    pub preview: Option<Preview>,
    #[serde(default)]
    pub gallery_data: Option<GalleryData>,
    #[serde(default)]
    pub media_metadata: Option<HashMap<String, MediaMetadata>>,
}

impl Post {
    pub fn community_label(&self) -> String {
        if !self.subreddit_name_prefixed.is_empty() {
            return self.subreddit_name_prefixed.clone();
        }
        format!("r/{}", self.subreddit)
    }

    pub fn web_url(&self) -> String {
        permalink_url(&self.permalink)
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PostMedia {
    #[serde(default)]
    pub reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RedditVideo {
    #[serde(default)]
    pub fallback_url: String,
    #[serde(default)]
    pub hls_url: String,
    #[serde(default)]
    pub dash_url: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub is_gif: bool,
    #[serde(default)]
    pub transcoding_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Preview {
    #[serde(default)]
    pub images: Vec<PreviewImage>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PreviewImage {
    #[serde(default)]
    pub source: Option<PreviewSource>,
    #[serde(default)]
    pub resolutions: Vec<PreviewSource>,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PreviewSource {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GalleryData {
    #[serde(default)]
    pub items: Vec<GalleryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GalleryItem {
    #[serde(default)]
    pub id: i64,
    pub media_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MediaMetadata {
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "e")]
    pub kind: String,
    #[serde(default, rename = "m")]
    pub mime: String,
    #[serde(default, rename = "s")]
    pub source: Option<MediaMetadataImage>,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MediaMetadataImage {
    #[serde(default, rename = "u")]
    pub url: Option<String>,
    #[serde(default, rename = "x")]
    pub width: i64,
    #[serde(default, rename = "y")]
    pub height: i64,
    #[serde(default)]
    pub gif: Option<String>,
    #[serde(default)]
    pub mp4: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ListingEnvelope<T> {
    #[serde(default)]
    kind: String,
    data: Listing<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
        "kind": "Listing",
        "data": {
            "after": "t3_next",
            "before": null,
            "children": [
                {"kind": "t3", "data": {
                    "id": "abc", "name": "t3_abc", "title": "Hello",
                    "author": "someone", "subreddit": "rust",
                    "subreddit_name_prefixed": "r/rust", "score": 42,
                    "num_comments": 7, "created_utc": 1700000000.0,
                    "permalink": "/r/rust/comments/abc/hello/",
                    "is_video": false, "is_self": true, "selftext": "body",
                    "media_metadata": {"m1": {"status": "valid", "e": "Image", "s": {"u": "https://i.redd.it/1.jpg", "x": 10, "y": 20}}},
                    "gallery_data": {"items": [{"id": 1, "media_id": "m1"}]}
                }}
            ]
        }
    }"#;

    #[test]
    fn decodes_listing_envelope() {
        let envelope: ListingEnvelope<Post> = serde_json::from_str(LISTING).unwrap();
        let listing = envelope.data;
        assert_eq!(listing.after.as_deref(), Some("t3_next"));
        let posts = listing.into_items();
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.id, "abc");
        assert_eq!(post.community_label(), "r/rust");
        assert!(post.is_self);
        let meta = post.media_metadata.as_ref().unwrap();
        assert_eq!(
            meta["m1"].source.as_ref().unwrap().url.as_deref(),
            Some("https://i.redd.it/1.jpg")
        );
    }

    #[test]
    fn null_cursor_means_end_of_feed() {
        let raw = r#"{"kind": "Listing", "data": {"after": null, "children": []}}"#;
        let envelope: ListingEnvelope<Post> = serde_json::from_str(raw).unwrap();
        assert!(envelope.data.after.is_none());
        assert!(envelope.data.children.is_empty());
    }

    #[test]
    fn permalink_becomes_web_url() {
        assert_eq!(
            permalink_url("/r/rust/comments/abc/hello/"),
            "https://www.reddit.com/r/rust/comments/abc/hello/"
        );
        assert_eq!(permalink_url("https://example.com/x"), "https://example.com/x");
    }

    #[test]
    fn listing_url_carries_paging_params() {
        let client = Client::new(ClientConfig {
            user_agent: "lurk-test/0.1".into(),
            ..ClientConfig::default()
        })
        .unwrap();
        let mut params = vec![("sort".to_string(), "top".to_string())];
        params.extend(client.page_params(Some("t3_abc")));
        let url = build_url(&client.public_base, "r/popular/top.json", &params).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.reddit.com/r/popular/top.json?sort=top&limit=25&raw_json=1&after=t3_abc"
        );
    }

    #[test]
    fn requires_user_agent() {
        assert!(Client::new(ClientConfig::default()).is_err());
    }
}
