//! Per-screen feed state.
//!
//! The screen asks for a request with one of the `begin_*` methods, runs it on
//! a worker thread and hands the result back through [`FeedState::apply`].
//! Every request carries an id; results for anything but the latest request of
//! their kind are dropped.

use anyhow::Result;
use tracing::{debug, warn};

use crate::data::{FeedService, FeedSource};
use crate::reddit::{Listing, Post};

/// Share of one viewport of remaining content that triggers a load-more.
pub const END_REACHED_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Initial,
    Refresh,
    More,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Replace,
    Append,
}

impl LoadKind {
    pub fn mode(self) -> LoadMode {
        match self {
            LoadKind::Initial | LoadKind::Refresh => LoadMode::Replace,
            LoadKind::More => LoadMode::Append,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub request_id: u64,
    pub kind: LoadKind,
    pub source: FeedSource,
    pub after: Option<String>,
}

impl FeedRequest {
    pub fn run(&self, service: &dyn FeedService) -> Result<Listing<Post>> {
        service.load(&self.source, self.after.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct FeedState {
    source: FeedSource,
    posts: Vec<Post>,
    after: Option<String>,
    loading: bool,
    refreshing: bool,
    loading_more: bool,
    error: Option<String>,
    next_request_id: u64,
    pending_replace: Option<u64>,
    pending_more: Option<u64>,
}

impl FeedState {
    pub fn new(source: FeedSource) -> Self {
        Self {
            source,
            posts: Vec::new(),
            after: None,
            loading: false,
            refreshing: false,
            loading_more: false,
            error: None,
            next_request_id: 1,
            pending_replace: None,
            pending_more: None,
        }
    }

    pub fn source(&self) -> &FeedSource {
        &self.source
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn after(&self) -> Option<&str> {
        self.after.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.loading || self.refreshing || self.loading_more
    }

    /// First page with the full-screen spinner.
    pub fn begin_initial(&mut self) -> FeedRequest {
        self.loading = true;
        self.error = None;
        self.request(LoadKind::Initial, None)
    }

    /// First page again; the current posts stay visible until it lands.
    pub fn begin_refresh(&mut self) -> FeedRequest {
        self.refreshing = true;
        self.request(LoadKind::Refresh, None)
    }

    /// Next page, unless one is already in flight, a replace is pending or the feed has ended.
    pub fn begin_load_more(&mut self) -> Option<FeedRequest> {
        if self.loading_more || self.loading || self.refreshing {
            return None;
        }
        let after = self.after.clone()?;
        self.loading_more = true;
        Some(self.request(LoadKind::More, Some(after)))
    }

    /// Folds a finished request into the state. Returns false for superseded results.
    pub fn apply(&mut self, request: &FeedRequest, result: Result<Listing<Post>>) -> bool {
        match request.kind.mode() {
            LoadMode::Replace => {
                if self.pending_replace != Some(request.request_id) {
                    debug!(source = %self.source, request_id = request.request_id, "feed: stale page dropped");
                    return false;
                }
                self.pending_replace = None;
                self.loading = false;
                self.refreshing = false;
            }
            LoadMode::Append => {
                if self.pending_more != Some(request.request_id) {
                    debug!(source = %self.source, request_id = request.request_id, "feed: stale page dropped");
                    return false;
                }
                self.pending_more = None;
                self.loading_more = false;
            }
        }

        match result {
            Ok(listing) => {
                self.after = listing.after.clone().filter(|cursor| !cursor.trim().is_empty());
                let posts = listing.into_items();
                debug!(
                    source = %self.source,
                    kind = ?request.kind,
                    count = posts.len(),
                    has_more = self.after.is_some(),
                    "feed: page applied"
                );
                match request.kind.mode() {
                    LoadMode::Replace => {
                        self.posts = posts;
                        self.error = None;
                    }
                    LoadMode::Append => self.posts.extend(posts),
                }
            }
            Err(err) => match request.kind {
                LoadKind::Initial => {
                    warn!(source = %self.source, error = %format!("{err:#}"), "feed: initial load failed");
                    self.error = Some(format!("{err:#}"));
                }
                LoadKind::Refresh => {
                    warn!(source = %self.source, error = %format!("{err:#}"), "feed: refresh failed");
                }
                LoadKind::More => {
                    warn!(source = %self.source, error = %format!("{err:#}"), "feed: load more failed");
                }
            },
        }
        true
    }

    /// Drops a post locally. No request is made.
    pub fn hide(&mut self, id: &str) -> bool {
        let before = self.posts.len();
        self.posts.retain(|post| post.id != id);
        before != self.posts.len()
    }

    /// Forgets everything, including requests in flight.
    pub fn reset(&mut self) {
        self.posts.clear();
        self.after = None;
        self.loading = false;
        self.refreshing = false;
        self.loading_more = false;
        self.error = None;
        self.pending_replace = None;
        self.pending_more = None;
    }

    /// Reloads once credentials appear, clears when they go away.
    pub fn on_auth_changed(&mut self, authenticated: bool) -> Option<FeedRequest> {
        if authenticated {
            Some(self.begin_initial())
        } else {
            self.reset();
            None
        }
    }

    /// True when the content left below the viewport is at most half a viewport.
    pub fn near_end(remaining: f64, viewport: f64) -> bool {
        remaining <= viewport * END_REACHED_THRESHOLD
    }

    fn request(&mut self, kind: LoadKind, after: Option<String>) -> FeedRequest {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        match kind.mode() {
            LoadMode::Replace => {
                self.pending_replace = Some(request_id);
                // a page of the old listing must not land on the new one
                self.pending_more = None;
                self.loading_more = false;
            }
            LoadMode::Append => self.pending_more = Some(request_id),
        }
        FeedRequest {
            request_id,
            kind,
            source: self.source.clone(),
            after,
        }
    }
}
