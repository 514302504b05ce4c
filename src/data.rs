use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::reddit::{self, Listing, Post, SortOption, TimeFilter, TokenProvider};

/// Where a feed screen pulls its pages from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Popular { sort: SortOption, time: TimeFilter },
    Subreddit {
        name: String,
        sort: SortOption,
        time: TimeFilter,
    },
    Home { sort: SortOption },
}

impl FeedSource {
    pub fn popular() -> Self {
        FeedSource::Popular {
            sort: SortOption::Top,
            time: TimeFilter::Day,
        }
    }

    pub fn subreddit(name: impl Into<String>) -> Self {
        FeedSource::Subreddit {
            name: name.into(),
            sort: SortOption::Hot,
            time: TimeFilter::Day,
        }
    }

    pub fn home() -> Self {
        FeedSource::Home {
            sort: SortOption::Hot,
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedSource::Popular { .. } => write!(f, "r/popular"),
            FeedSource::Subreddit { name, .. } => write!(f, "r/{}", name.trim_start_matches("r/")),
            FeedSource::Home { .. } => write!(f, "home"),
        }
    }
}

pub trait FeedService: Send + Sync {
    fn load(&self, source: &FeedSource, after: Option<&str>) -> Result<Listing<Post>>;
}

pub struct RedditFeedService {
    client: Arc<reddit::Client>,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl RedditFeedService {
    pub fn new(client: Arc<reddit::Client>, tokens: Option<Arc<dyn TokenProvider>>) -> Self {
        Self { client, tokens }
    }
}

impl FeedService for RedditFeedService {
    fn load(&self, source: &FeedSource, after: Option<&str>) -> Result<Listing<Post>> {
        match source {
            FeedSource::Popular { sort, time } => self
                .client
                .popular(*sort, *time, after)
                .context("fetch popular feed"),
            FeedSource::Subreddit { name, sort, time } => self
                .client
                .subreddit(name, *sort, *time, after)
                .with_context(|| format!("fetch r/{name} feed")),
            FeedSource::Home { sort } => {
                let provider = self
                    .tokens
                    .as_ref()
                    .ok_or_else(|| anyhow!("sign in required"))?;
                let token = provider.token().context("sign in required")?;
                self.client
                    .home(&token.access_token, *sort, after)
                    .context("fetch home feed")
            }
        }
    }
}

/// Offline pages used when no network client could be built, and by tests.
#[derive(Default)]
pub struct MockFeedService;

impl FeedService for MockFeedService {
    fn load(&self, source: &FeedSource, after: Option<&str>) -> Result<Listing<Post>> {
        let page = after
            .and_then(|cursor| cursor.strip_prefix("t3_mockpage"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        let posts = (0..5)
            .map(|i| {
                let n = page * 5 + i;
                sample_post(
                    &format!("mock{n}"),
                    &format!("Sample post {} from {}", n + 1, source),
                )
            })
            .collect::<Vec<_>>();
        let after = if page < 2 {
            Some(format!("t3_mockpage{}", page + 1))
        } else {
            None
        };
        Ok(Listing {
            after,
            before: None,
            children: posts
                .into_iter()
                .map(|post| reddit::Thing {
                    kind: "t3".into(),
                    data: post,
                })
                .collect(),
        })
    }
}

pub fn sample_post(id: &str, title: &str) -> Post {
    Post {
        id: id.to_string(),
        name: format!("t3_{id}"),
        title: title.to_string(),
        author: "lurk".to_string(),
        subreddit: "lurk".to_string(),
        subreddit_name_prefixed: "r/lurk".to_string(),
        score: 1234,
        num_comments: 56,
        created_utc: 0.0,
        permalink: format!("/r/lurk/comments/{id}/"),
        is_self: true,
        selftext: "Sample content provided for offline browsing.".to_string(),
        ..Post::default()
    }
}
