use std::io::{self, Stdout};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, window_size, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use tracing::{debug, info};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::card::{CardSwipe, SwipeAction};
use crate::data::{FeedService, FeedSource};
use crate::feed::{FeedRequest, FeedState, LoadKind};
use crate::format::{decode_html_entities, format_clock, format_score, time_ago};
use crate::media::{PostMedia, TapTarget, VideoSource};
use crate::reddit::{Listing, Post};
use crate::session::{self, AuthState};
use crate::video::{MpvOptions, MpvPlayback};
use crate::viewer::{ImagePhase, ImageViewer, VideoPhase, VideoViewer, ViewerConfig};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);
const COLOR_OVERLAY: Color = Color::Rgb(0, 0, 0);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TICK_RATE: Duration = Duration::from_millis(120);
/// Rows taken by one post card, borders included.
const CARD_HEIGHT: u16 = 6;
/// Row of the media summary inside a card, counted from the card's top border.
const CARD_MEDIA_ROW: u16 = 3;
/// Keyboard scrubbing step as a share of the video length.
const SCRUB_STEP: f64 = 0.05;
const FALLBACK_CELL_WIDTH: f64 = 8.0;
const FALLBACK_CELL_HEIGHT: f64 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Popular,
    Subreddits,
    Home,
}

impl Tab {
    const ALL: [Tab; 3] = [Tab::Popular, Tab::Subreddits, Tab::Home];

    fn title(self) -> &'static str {
        match self {
            Tab::Popular => "Popular",
            Tab::Subreddits => "Subreddits",
            Tab::Home => "Home",
        }
    }

    fn next(self) -> Self {
        match self {
            Tab::Popular => Tab::Subreddits,
            Tab::Subreddits => Tab::Home,
            Tab::Home => Tab::Popular,
        }
    }

    fn previous(self) -> Self {
        match self {
            Tab::Popular => Tab::Home,
            Tab::Subreddits => Tab::Popular,
            Tab::Home => Tab::Subreddits,
        }
    }
}

/// Which screen a feed response belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FeedSlot {
    Popular,
    Community(String),
    Home,
}

/// Size of one terminal cell in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CellMetrics {
    width: f64,
    height: f64,
}

fn terminal_cell_metrics() -> CellMetrics {
    window_size().ok().map_or(
        CellMetrics {
            width: FALLBACK_CELL_WIDTH,
            height: FALLBACK_CELL_HEIGHT,
        },
        |size| {
            let columns = f64::from(size.columns.max(1));
            let rows = f64::from(size.rows.max(1));
            let width = if size.width > 0 {
                f64::from(size.width) / columns
            } else {
                FALLBACK_CELL_WIDTH
            };
            let height = if size.height > 0 {
                f64::from(size.height) / rows
            } else {
                FALLBACK_CELL_HEIGHT
            };
            CellMetrics { width, height }
        },
    )
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= TICK_RATE {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

/// A feed request bound to the screen that issued it.
struct FeedJob {
    slot: FeedSlot,
    retired: Arc<AtomicBool>,
    request: FeedRequest,
}

/// One scrollable list of post cards.
struct FeedScreen {
    slot: FeedSlot,
    state: FeedState,
    selected: usize,
    offset: usize,
    view_rows: u16,
    can_hide: bool,
    swipe: CardSwipe,
    swipe_index: Option<usize>,
    retired: Arc<AtomicBool>,
}

impl FeedScreen {
    fn new(slot: FeedSlot, source: FeedSource, can_hide: bool) -> Self {
        Self {
            slot,
            state: FeedState::new(source),
            selected: 0,
            offset: 0,
            view_rows: 0,
            can_hide,
            swipe: CardSwipe::new(),
            swipe_index: None,
            retired: Arc::new(AtomicBool::new(false)),
        }
    }

    fn job(&self, request: FeedRequest) -> FeedJob {
        FeedJob {
            slot: self.slot.clone(),
            retired: self.retired.clone(),
            request,
        }
    }

    fn initial(&mut self) -> FeedJob {
        let request = self.state.begin_initial();
        self.job(request)
    }

    /// Retries the first page after a failed initial load, refreshes otherwise.
    fn refresh(&mut self) -> FeedJob {
        let request = if self.state.posts().is_empty() {
            self.state.begin_initial()
        } else {
            self.state.begin_refresh()
        };
        self.job(request)
    }

    fn more(&mut self) -> Option<FeedJob> {
        if self.view_rows == 0 || self.state.posts().is_empty() {
            return None;
        }
        let total = self.state.posts().len() as f64 * f64::from(CARD_HEIGHT);
        let bottom = self.offset as f64 * f64::from(CARD_HEIGHT) + f64::from(self.view_rows);
        let remaining = (total - bottom).max(0.0);
        if !FeedState::near_end(remaining, f64::from(self.view_rows)) {
            return None;
        }
        let request = self.state.begin_load_more()?;
        Some(self.job(request))
    }

    fn selected_post(&self) -> Option<&Post> {
        self.state.posts().get(self.selected)
    }

    fn visible_cards(&self) -> usize {
        (usize::from(self.view_rows) / usize::from(CARD_HEIGHT)).max(1)
    }

    fn clamp_selection(&mut self) {
        let len = self.state.posts().len();
        if len == 0 {
            self.selected = 0;
            self.offset = 0;
            return;
        }
        self.selected = self.selected.min(len - 1);
        self.ensure_visible();
    }

    fn ensure_visible(&mut self) {
        let visible = self.visible_cards();
        if self.selected < self.offset {
            self.offset = self.selected;
        } else if self.selected >= self.offset + visible {
            self.offset = self.selected + 1 - visible;
        }
    }

    fn move_selection(&mut self, delta: i32) -> bool {
        let len = self.state.posts().len();
        if len == 0 {
            return false;
        }
        let current = self.selected as i64;
        let next = (current + i64::from(delta)).clamp(0, len as i64 - 1) as usize;
        if next == self.selected {
            return false;
        }
        self.selected = next;
        self.ensure_visible();
        true
    }

    fn hide_selected(&mut self) -> Option<String> {
        if !self.can_hide {
            return None;
        }
        let post = self.selected_post()?;
        let id = post.id.clone();
        let title = post.title.clone();
        if self.state.hide(&id) {
            self.swipe.reset();
            self.swipe_index = None;
            self.clamp_selection();
            Some(title)
        } else {
            None
        }
    }

    fn label(&self) -> String {
        self.state.source().to_string()
    }
}

impl Drop for FeedScreen {
    fn drop(&mut self) {
        self.retired.store(true, Ordering::SeqCst);
    }
}

/// The Subreddits tab: a picker, or the feed of the chosen community.
struct CommunitiesView {
    picker_index: usize,
    screen: Option<FeedScreen>,
}

struct DetailView {
    post: Post,
    scroll: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragTarget {
    Card { index: usize },
    Image,
    VideoArea,
    Scrub,
    DetailMedia,
    Nothing,
}

#[derive(Debug, Clone, Copy)]
struct Gesture {
    target: DragTarget,
    column: u16,
    row: u16,
}

#[derive(Debug, Clone, Copy, Default)]
struct VideoHitAreas {
    back: Rect,
    play: Rect,
    forward: Rect,
    bar: Rect,
}

enum AsyncResponse {
    Feed {
        slot: FeedSlot,
        request: FeedRequest,
        result: Result<Listing<Post>>,
    },
    AuthRestored {
        state: AuthState,
    },
    Login {
        result: Result<()>,
    },
}

#[derive(Clone)]
pub struct Options {
    pub status_message: String,
    pub feed_service: Arc<dyn FeedService>,
    pub session: Arc<session::Manager>,
    pub communities: Vec<String>,
    pub home_url: String,
    pub viewer: ViewerConfig,
    pub mpv: MpvOptions,
    pub config_path: String,
}

pub struct Model {
    status_message: String,
    tab: Tab,
    popular: FeedScreen,
    communities: CommunitiesView,
    community_names: Vec<String>,
    home: FeedScreen,
    home_url: String,
    detail: Option<DetailView>,
    image_viewer: ImageViewer,
    video_viewer: VideoViewer,
    mpv: MpvOptions,
    feed_service: Arc<dyn FeedService>,
    session: Arc<session::Manager>,
    config_path: String,
    login_in_progress: bool,
    metrics: CellMetrics,
    screen_px: (f64, f64),
    tab_areas: Vec<(Tab, Rect)>,
    list_area: Rect,
    detail_media_row: Option<u16>,
    video_hits: Option<VideoHitAreas>,
    gesture: Option<Gesture>,
    spinner: Spinner,
    needs_redraw: bool,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let mut model = Self {
            status_message: opts.status_message.clone(),
            tab: Tab::Popular,
            popular: FeedScreen::new(FeedSlot::Popular, FeedSource::popular(), true),
            communities: CommunitiesView {
                picker_index: 0,
                screen: None,
            },
            community_names: opts.communities.clone(),
            home: FeedScreen::new(FeedSlot::Home, FeedSource::home(), false),
            home_url: opts.home_url.clone(),
            detail: None,
            image_viewer: ImageViewer::new(opts.viewer.clone()),
            video_viewer: VideoViewer::new(opts.viewer.clone()),
            mpv: opts.mpv.clone(),
            feed_service: opts.feed_service.clone(),
            session: opts.session.clone(),
            config_path: opts.config_path.clone(),
            login_in_progress: false,
            metrics: terminal_cell_metrics(),
            screen_px: (opts.viewer.screen_width, opts.viewer.screen_height),
            tab_areas: Vec::new(),
            list_area: Rect::default(),
            detail_media_row: None,
            video_hits: None,
            gesture: None,
            spinner: Spinner::new(),
            needs_redraw: true,
            response_tx,
            response_rx,
        };

        let job = model.popular.initial();
        model.dispatch(job);
        model.queue_session_restore();
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        self.video_viewer.close();
        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = TICK_RATE
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                            }
                        }
                        self.mark_dirty();
                    }
                    Event::Mouse(mouse) => {
                        if let Err(err) = self.handle_mouse(mouse) {
                            self.status_message = format!("Error: {}", err);
                        }
                        self.mark_dirty();
                    }
                    Event::Resize(_, _) => {
                        self.metrics = terminal_cell_metrics();
                        self.mark_dirty();
                    }
                    _ => {}
                }
            }

            if self.poll_async() {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= TICK_RATE {
                last_tick = Instant::now();
                if self.tick(last_tick) {
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    /// Advances animations, timers and the spinner. Returns true when a redraw is due.
    fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if self.image_viewer.is_open() {
            self.image_viewer.tick(now);
            changed = true;
        }
        if self.video_viewer.is_open() {
            self.video_viewer.tick(now);
            changed = true;
        }
        if let Some(screen) = self.active_screen_mut() {
            if screen.swipe_index.is_some() {
                changed = true;
                if !screen.swipe.is_active() && screen.swipe.offset(now) == 0.0 {
                    screen.swipe_index = None;
                }
            }
        }
        if self.is_loading() || self.login_in_progress {
            changed |= self.spinner.advance();
        } else {
            self.spinner.reset();
        }
        changed
    }

    fn is_loading(&self) -> bool {
        self.popular.state.is_busy()
            || self.home.state.is_busy()
            || self
                .communities
                .screen
                .as_ref()
                .is_some_and(|screen| screen.state.is_busy())
            || self.session.is_loading()
    }

    fn dispatch(&self, job: FeedJob) {
        let FeedJob {
            slot,
            retired,
            request,
        } = job;
        debug!(?slot, request_id = request.request_id, kind = ?request.kind, "ui: feed request");
        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = request.run(service.as_ref());
            if retired.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::Feed {
                slot,
                request,
                result,
            });
        });
    }

    fn queue_session_restore(&self) {
        let manager = self.session.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let state = manager.restore();
            let _ = tx.send(AsyncResponse::AuthRestored { state });
        });
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Feed {
                slot,
                request,
                result,
            } => {
                let failure = result.as_ref().err().map(|err| format!("{err:#}"));
                let is_active = self.active_slot().as_ref() == Some(&slot);
                let Some(screen) = self.screen_for_slot_mut(&slot) else {
                    debug!(?slot, "ui: response for a retired screen dropped");
                    return;
                };
                if !screen.state.apply(&request, result) {
                    return;
                }
                screen.clamp_selection();
                let summary = format!("{} · {} posts", screen.label(), screen.state.posts().len());
                if is_active {
                    self.status_message = match (request.kind, failure) {
                        (LoadKind::Initial, Some(err)) => format!("Failed to load posts: {err}"),
                        _ => summary,
                    };
                }
                self.maybe_request_more();
            }
            AsyncResponse::AuthRestored { state } => {
                debug!(?state, "ui: session restored");
                if state == AuthState::SignedIn {
                    self.on_auth_changed(true);
                }
            }
            AsyncResponse::Login { result } => {
                self.login_in_progress = false;
                match result {
                    Ok(()) => {
                        self.status_message = "Signed in. Loading your home feed…".to_string();
                        self.on_auth_changed(true);
                    }
                    Err(err) => {
                        self.status_message = format!("Sign-in failed: {err:#}");
                    }
                }
            }
        }
    }

    fn on_auth_changed(&mut self, authenticated: bool) {
        if let Some(request) = self.home.state.on_auth_changed(authenticated) {
            let job = self.home.job(request);
            self.dispatch(job);
        }
        self.home.selected = 0;
        self.home.offset = 0;
    }

    fn active_slot(&self) -> Option<FeedSlot> {
        match self.tab {
            Tab::Popular => Some(FeedSlot::Popular),
            Tab::Subreddits => self
                .communities
                .screen
                .as_ref()
                .map(|screen| screen.slot.clone()),
            Tab::Home if self.session.is_authenticated() => Some(FeedSlot::Home),
            Tab::Home => None,
        }
    }

    fn screen_for_slot_mut(&mut self, slot: &FeedSlot) -> Option<&mut FeedScreen> {
        match slot {
            FeedSlot::Popular => Some(&mut self.popular),
            FeedSlot::Home => Some(&mut self.home),
            FeedSlot::Community(_) => self
                .communities
                .screen
                .as_mut()
                .filter(|screen| &screen.slot == slot),
        }
    }

    fn active_screen(&self) -> Option<&FeedScreen> {
        match self.tab {
            Tab::Popular => Some(&self.popular),
            Tab::Subreddits => self.communities.screen.as_ref(),
            Tab::Home if self.session.is_authenticated() => Some(&self.home),
            Tab::Home => None,
        }
    }

    fn active_screen_mut(&mut self) -> Option<&mut FeedScreen> {
        match self.tab {
            Tab::Popular => Some(&mut self.popular),
            Tab::Subreddits => self.communities.screen.as_mut(),
            Tab::Home if self.session.is_authenticated() => Some(&mut self.home),
            Tab::Home => None,
        }
    }

    fn maybe_request_more(&mut self) {
        let job = match self.active_screen_mut() {
            Some(screen) => screen.more(),
            None => None,
        };
        if let Some(job) = job {
            self.status_message = "Loading more posts…".to_string();
            self.dispatch(job);
        }
    }

    fn refresh_active(&mut self) {
        let job = match self.active_screen_mut() {
            Some(screen) => {
                let label = screen.label();
                let job = screen.refresh();
                self.status_message = format!("Refreshing {label}…");
                job
            }
            None => return,
        };
        self.dispatch(job);
    }

    fn select_tab(&mut self, tab: Tab) {
        if tab == self.tab {
            if tab == Tab::Subreddits && self.communities.screen.is_some() {
                self.close_community();
            }
            return;
        }
        self.tab = tab;
        self.detail = None;
        self.status_message = match tab {
            Tab::Popular => self.popular.label(),
            Tab::Subreddits => "Pick a community.".to_string(),
            Tab::Home if self.session.is_authenticated() => self.home.label(),
            Tab::Home => "Sign in to see your home feed.".to_string(),
        };
        self.maybe_request_more();
    }

    fn open_picker_entry(&mut self, index: usize) -> Result<()> {
        if index == 0 {
            let url = self.home_url.clone();
            return self.open_url(&url);
        }
        let Some(name) = self.community_names.get(index - 1).cloned() else {
            return Ok(());
        };
        let mut screen = FeedScreen::new(
            FeedSlot::Community(name.clone()),
            FeedSource::subreddit(name),
            false,
        );
        let job = screen.initial();
        self.status_message = format!("Loading {}…", screen.label());
        self.communities.screen = Some(screen);
        self.dispatch(job);
        Ok(())
    }

    fn close_community(&mut self) {
        self.communities.screen = None;
        self.detail = None;
        self.status_message = "Pick a community.".to_string();
    }

    fn open_url(&mut self, url: &str) -> Result<()> {
        info!(%url, "ui: opening in browser");
        self.status_message = format!("Opened {url}");
        if cfg!(test) {
            return Ok(());
        }
        if let Err(err) = webbrowser::open(url) {
            self.status_message = format!("Failed to open {url}: {err}");
        }
        Ok(())
    }

    fn open_media(&mut self, post: &Post, start: usize) {
        let now = Instant::now();
        match PostMedia::from_post(post).tap_target(start) {
            TapTarget::Video(source) => self.open_video(source, now),
            TapTarget::Images { images, start } => {
                let count = images.len();
                if self.image_viewer.open(images, start) {
                    self.status_message = if count > 1 {
                        format!("Gallery · {} images", count)
                    } else {
                        "Image".to_string()
                    };
                }
            }
            TapTarget::None => {
                self.status_message = "This post has no media.".to_string();
            }
        }
    }

    fn open_video(&mut self, source: VideoSource, now: Instant) {
        let label = source.label.clone();
        let player = MpvPlayback::new(self.mpv.clone(), source.clone());
        self.video_viewer.open(source, Box::new(player), now);
        self.status_message = format!("Playing {label}");
    }

    fn start_login(&mut self) -> Result<()> {
        if self.login_in_progress {
            return Ok(());
        }
        if !self.session.can_sign_in() {
            self.status_message = format!(
                "Set reddit.client_id in {} (or run lurk --login) to sign in.",
                self.config_path
            );
            return Ok(());
        }
        let authz = self.session.begin_login()?;
        let url = authz.browser_url.clone();
        self.login_in_progress = true;
        self.status_message = match webbrowser::open(&url) {
            Ok(_) => "Authorize lurk in your browser, then return here.".to_string(),
            Err(err) => format!("Open {url} in your browser to authorize (auto-open failed: {err})."),
        };

        let tx = self.response_tx.clone();
        let manager = self.session.clone();
        thread::spawn(move || {
            let result = manager.complete_login(&authz);
            let _ = tx.send(AsyncResponse::Login { result });
        });
        Ok(())
    }

    fn sign_out(&mut self) -> Result<()> {
        if !self.session.is_authenticated() {
            return Ok(());
        }
        self.session.sign_out()?;
        self.on_auth_changed(false);
        self.detail = None;
        self.status_message = "Signed out.".to_string();
        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let now = Instant::now();
        if self.video_viewer.is_open() {
            self.handle_video_key(code, now);
            return Ok(false);
        }
        if self.image_viewer.is_open() {
            self.handle_image_key(code, now)?;
            return Ok(false);
        }
        if self.detail.is_some() {
            return self.handle_detail_key(code);
        }

        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Tab => self.select_tab(self.tab.next()),
            KeyCode::BackTab => self.select_tab(self.tab.previous()),
            KeyCode::Char('1') => self.select_tab(Tab::Popular),
            KeyCode::Char('2') => self.select_tab(Tab::Subreddits),
            KeyCode::Char('3') => self.select_tab(Tab::Home),
            _ => {
                if self.tab == Tab::Subreddits && self.communities.screen.is_none() {
                    self.handle_picker_key(code)?;
                } else if self.tab == Tab::Home && !self.session.is_authenticated() {
                    if matches!(code, KeyCode::Char('L') | KeyCode::Enter) {
                        self.start_login()?;
                    }
                } else {
                    self.handle_list_key(code)?;
                }
            }
        }
        Ok(false)
    }

    fn handle_picker_key(&mut self, code: KeyCode) -> Result<()> {
        let len = self.community_names.len() + 1;
        match code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.communities.picker_index = (self.communities.picker_index + 1).min(len - 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.communities.picker_index = self.communities.picker_index.saturating_sub(1);
            }
            KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
                self.open_picker_entry(self.communities.picker_index)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_list_key(&mut self, code: KeyCode) -> Result<()> {
        match code {
            KeyCode::Char('j') | KeyCode::Down => self.navigate(1),
            KeyCode::Char('k') | KeyCode::Up => self.navigate(-1),
            KeyCode::PageDown => {
                let step = self.active_screen().map_or(1, |s| s.visible_cards()) as i32;
                self.navigate(step);
            }
            KeyCode::PageUp => {
                let step = self.active_screen().map_or(1, |s| s.visible_cards()) as i32;
                self.navigate(-step);
            }
            KeyCode::Char('r') => self.refresh_active(),
            KeyCode::Enter => self.open_detail(),
            KeyCode::Char('m') | KeyCode::Char(' ') => {
                if let Some(post) = self.active_screen().and_then(|s| s.selected_post()).cloned() {
                    self.open_media(&post, 0);
                }
            }
            KeyCode::Char('o') => {
                if let Some(url) = self
                    .active_screen()
                    .and_then(|s| s.selected_post())
                    .map(|post| post.web_url())
                {
                    self.open_url(&url)?;
                }
            }
            KeyCode::Char('h') => self.hide_selected(),
            KeyCode::Char('X') if self.tab == Tab::Home => self.sign_out()?,
            KeyCode::Esc | KeyCode::Backspace if self.tab == Tab::Subreddits => {
                self.close_community();
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_detail_key(&mut self, code: KeyCode) -> Result<bool> {
        let Some(detail) = self.detail.as_mut() else {
            return Ok(false);
        };
        match code {
            KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('q') => {
                self.detail = None;
            }
            KeyCode::Char('j') | KeyCode::Down => detail.scroll = detail.scroll.saturating_add(1),
            KeyCode::Char('k') | KeyCode::Up => detail.scroll = detail.scroll.saturating_sub(1),
            KeyCode::Char('o') => {
                let url = detail.post.web_url();
                self.open_url(&url)?;
            }
            KeyCode::Enter | KeyCode::Char('m') | KeyCode::Char(' ') => {
                let post = detail.post.clone();
                self.open_media(&post, 0);
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_image_key(&mut self, code: KeyCode, now: Instant) -> Result<()> {
        match code {
            KeyCode::Left | KeyCode::Char('h') => {
                self.image_viewer.step(false, now);
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.image_viewer.step(true, now);
            }
            KeyCode::Char('o') => {
                let index = self.image_viewer.active_index(now);
                if let Some(url) = self.image_viewer.images().get(index).map(|i| i.url.clone()) {
                    self.open_url(&url)?;
                }
            }
            KeyCode::Esc
            | KeyCode::Char('q')
            | KeyCode::Enter
            | KeyCode::Char(' ')
            | KeyCode::Down
            | KeyCode::Char('j') => self.image_viewer.tap(now),
            _ => {}
        }
        Ok(())
    }

    fn handle_video_key(&mut self, code: KeyCode, now: Instant) {
        match code {
            KeyCode::Char(' ') | KeyCode::Char('p') => self.video_viewer.toggle_play(now),
            KeyCode::Left => self.video_viewer.skip(false, now),
            KeyCode::Right => self.video_viewer.skip(true, now),
            KeyCode::Char(',') | KeyCode::Char('.') => {
                let frame = self.video_viewer.frame(now);
                let delta = if code == KeyCode::Char('.') {
                    SCRUB_STEP
                } else {
                    -SCRUB_STEP
                };
                self.video_viewer.begin_scrub();
                self.video_viewer.scrub_to(frame.progress + delta);
                self.video_viewer.end_scrub(now);
            }
            KeyCode::Char('c') => self.video_viewer.tap_video(now),
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Down | KeyCode::Char('j') => {
                self.video_viewer.dismiss(now);
            }
            _ => {}
        }
    }

    fn navigate(&mut self, delta: i32) {
        let moved = self
            .active_screen_mut()
            .is_some_and(|screen| screen.move_selection(delta));
        if moved {
            self.maybe_request_more();
        }
    }

    fn open_detail(&mut self) {
        if let Some(post) = self.active_screen().and_then(|s| s.selected_post()).cloned() {
            self.detail = Some(DetailView { post, scroll: 0 });
        }
    }

    fn hide_selected(&mut self) {
        let hidden = self.active_screen_mut().and_then(|screen| screen.hide_selected());
        if let Some(title) = hidden {
            self.status_message = format!("Hidden: {}", truncate(&title, 60));
            self.maybe_request_more();
        }
    }

    fn handle_mouse(&mut self, event: MouseEvent) -> Result<()> {
        let now = Instant::now();
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => self.pointer_down(event.column, event.row, now)?,
            MouseEventKind::Drag(MouseButton::Left) => self.pointer_move(event.column, event.row, now),
            MouseEventKind::Up(MouseButton::Left) => self.pointer_up(event.column, event.row, now)?,
            MouseEventKind::ScrollDown if !self.overlay_open() => self.navigate(1),
            MouseEventKind::ScrollUp if !self.overlay_open() => self.navigate(-1),
            _ => {}
        }
        Ok(())
    }

    fn overlay_open(&self) -> bool {
        self.image_viewer.is_open() || self.video_viewer.is_open() || self.detail.is_some()
    }

    /// Pointer travel since the press, in logical pixels.
    fn travel(&self, gesture: &Gesture, column: u16, row: u16) -> (f64, f64) {
        let dx = (f64::from(column) - f64::from(gesture.column)) * self.metrics.width;
        let dy = (f64::from(row) - f64::from(gesture.row)) * self.metrics.height;
        (dx, dy)
    }

    fn pointer_down(&mut self, column: u16, row: u16, now: Instant) -> Result<()> {
        let target = if self.video_viewer.is_open() {
            self.video_pointer_down(column, row, now)
        } else if self.image_viewer.is_open() {
            DragTarget::Image
        } else if self.detail.is_some() {
            if self.detail_media_row == Some(row) {
                DragTarget::DetailMedia
            } else {
                DragTarget::Nothing
            }
        } else {
            self.list_pointer_down(column, row)?
        };
        self.gesture = Some(Gesture {
            target,
            column,
            row,
        });
        Ok(())
    }

    fn video_pointer_down(&mut self, column: u16, row: u16, now: Instant) -> DragTarget {
        let hits = if self.video_viewer.controls_visible() {
            self.video_hits
        } else {
            None
        };
        let Some(hits) = hits else {
            return DragTarget::VideoArea;
        };
        if contains(hits.back, column, row) {
            self.video_viewer.skip(false, now);
            DragTarget::Nothing
        } else if contains(hits.forward, column, row) {
            self.video_viewer.skip(true, now);
            DragTarget::Nothing
        } else if contains(hits.play, column, row) {
            self.video_viewer.toggle_play(now);
            DragTarget::Nothing
        } else if contains(hits.bar, column, row) {
            self.video_viewer.begin_scrub();
            self.video_viewer.scrub_to(bar_fraction(hits.bar, column));
            DragTarget::Scrub
        } else {
            DragTarget::VideoArea
        }
    }

    fn list_pointer_down(&mut self, column: u16, row: u16) -> Result<DragTarget> {
        if let Some(tab) = self
            .tab_areas
            .iter()
            .find(|(_, area)| contains(*area, column, row))
            .map(|(tab, _)| *tab)
        {
            self.select_tab(tab);
            return Ok(DragTarget::Nothing);
        }
        if !contains(self.list_area, column, row) {
            return Ok(DragTarget::Nothing);
        }
        let slot = usize::from((row - self.list_area.y) / CARD_HEIGHT);
        if self.tab == Tab::Subreddits && self.communities.screen.is_none() {
            let index = usize::from(row - self.list_area.y) / 2;
            if index <= self.community_names.len() {
                self.communities.picker_index = index;
                self.open_picker_entry(index)?;
            }
            return Ok(DragTarget::Nothing);
        }
        if self.tab == Tab::Home && !self.session.is_authenticated() {
            return Ok(DragTarget::Nothing);
        }
        let Some(screen) = self.active_screen_mut() else {
            return Ok(DragTarget::Nothing);
        };
        let index = screen.offset + slot;
        if index >= screen.state.posts().len() {
            return Ok(DragTarget::Nothing);
        }
        screen.selected = index;
        screen.swipe.reset();
        screen.swipe_index = Some(index);
        Ok(DragTarget::Card { index })
    }

    fn pointer_move(&mut self, column: u16, row: u16, now: Instant) {
        let Some(gesture) = self.gesture else {
            return;
        };
        let (dx, dy) = self.travel(&gesture, column, row);
        match gesture.target {
            DragTarget::Card { .. } => {
                if let Some(screen) = self.active_screen_mut() {
                    screen.swipe.update(dx);
                }
            }
            DragTarget::Image => self.image_viewer.drag_update(dx, dy, now),
            DragTarget::VideoArea => self.video_viewer.drag_update(dy),
            DragTarget::Scrub => {
                if let Some(hits) = self.video_hits {
                    self.video_viewer.scrub_to(bar_fraction(hits.bar, column));
                }
            }
            DragTarget::DetailMedia | DragTarget::Nothing => {}
        }
    }

    fn pointer_up(&mut self, column: u16, row: u16, now: Instant) -> Result<()> {
        let Some(gesture) = self.gesture.take() else {
            return Ok(());
        };
        let (dx, dy) = self.travel(&gesture, column, row);
        match gesture.target {
            DragTarget::Card { index } => self.release_card(index, dx, gesture.row, now)?,
            DragTarget::Image => {
                self.image_viewer.drag_end(dx, dy, now);
            }
            DragTarget::VideoArea => {
                self.video_viewer.drag_end(dy, now);
            }
            DragTarget::Scrub => self.video_viewer.end_scrub(now),
            DragTarget::DetailMedia => {
                if dx == 0.0 && dy == 0.0 {
                    if let Some(post) = self.detail.as_ref().map(|d| d.post.clone()) {
                        self.open_media(&post, 0);
                    }
                }
            }
            DragTarget::Nothing => {}
        }
        Ok(())
    }

    fn release_card(&mut self, index: usize, dx: f64, press_row: u16, now: Instant) -> Result<()> {
        let list_top = self.list_area.y;
        let Some(screen) = self.active_screen_mut() else {
            return Ok(());
        };
        let can_hide = screen.can_hide;
        let action = screen.swipe.release(dx, can_hide, now);
        let Some(post) = screen.state.posts().get(index).cloned() else {
            return Ok(());
        };
        let card_top = list_top + (index.saturating_sub(screen.offset) as u16) * CARD_HEIGHT;
        match action {
            SwipeAction::Tap => {
                let media = PostMedia::from_post(&post);
                if press_row == card_top + CARD_MEDIA_ROW && media.has_media_area() {
                    self.open_media(&post, 0);
                } else {
                    self.detail = Some(DetailView { post, scroll: 0 });
                }
            }
            SwipeAction::OpenExternal => self.open_url(&post.web_url())?,
            SwipeAction::Hide => self.hide_selected(),
            SwipeAction::Cancelled => {}
        }
        Ok(())
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        self.draw_tabs(frame, layout[0]);

        let status_text = if self.is_loading() || self.login_in_progress {
            format!("{} {}", self.spinner.frame(), self.status_message)
        } else {
            self.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[1]);

        let body = layout[2];
        let screen_px = (
            f64::from(body.width) * self.metrics.width,
            f64::from(body.height) * self.metrics.height,
        );
        if screen_px != self.screen_px {
            self.screen_px = screen_px;
            self.image_viewer.resize(screen_px.0, screen_px.1);
            self.video_viewer.resize(screen_px.0, screen_px.1);
        }

        match self.tab {
            Tab::Popular => self.draw_feed(frame, body),
            Tab::Subreddits if self.communities.screen.is_some() => self.draw_feed(frame, body),
            Tab::Subreddits => self.draw_picker(frame, body),
            Tab::Home if self.session.is_authenticated() => self.draw_feed(frame, body),
            Tab::Home => self.draw_home_prompt(frame, body),
        }

        self.detail_media_row = None;
        if self.detail.is_some() {
            self.draw_detail(frame, body);
        }
        self.video_hits = None;
        if self.image_viewer.is_open() {
            self.draw_image_viewer(frame, body);
        }
        if self.video_viewer.is_open() {
            self.draw_video_viewer(frame, body);
        }

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[3]);

        let more = self.active_screen().is_some() && !self.overlay_open();
        if more {
            self.maybe_request_more();
        }
    }

    fn draw_tabs(&mut self, frame: &mut Frame<'_>, area: Rect) {
        self.tab_areas.clear();
        let mut spans = Vec::new();
        let mut x = area.x;
        for tab in Tab::ALL {
            let label = format!(" {} ", tab.title());
            let width = label.width() as u16;
            let style = if tab == self.tab {
                Style::default()
                    .fg(COLOR_BG)
                    .bg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_SECONDARY)
            };
            self.tab_areas
                .push((tab, Rect::new(x, area.y, width.min(area.right().saturating_sub(x)), 1)));
            spans.push(Span::styled(label, style));
            spans.push(Span::raw(" "));
            x = x.saturating_add(width + 1);
        }
        let account = match self.session.state() {
            AuthState::Restoring => "restoring session…",
            AuthState::SignedOut => "signed out",
            AuthState::SignedIn => "signed in",
        };
        spans.push(Span::styled(
            format!("  lurk · {account}"),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ));
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(COLOR_PANEL_BG)),
            area,
        );
    }

    fn panel_block(title: String) -> Block<'static> {
        Block::default()
            .title(Span::styled(
                title,
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER_IDLE))
            .style(Style::default().bg(COLOR_PANEL_BG))
    }

    fn draw_feed(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let now = Instant::now();
        let title = match self.active_screen() {
            Some(screen) if self.tab == Tab::Subreddits => format!("{} · Esc back", screen.label()),
            Some(screen) => screen.label(),
            None => return,
        };
        let block = Self::panel_block(title);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.list_area = inner;

        let Some(screen) = self.active_screen_mut() else {
            return;
        };
        screen.view_rows = inner.height;
        screen.ensure_visible();

        if screen.state.posts().is_empty() {
            let (message, color) = if screen.state.is_loading() {
                ("Loading posts…".to_string(), COLOR_TEXT_SECONDARY)
            } else if let Some(err) = screen.state.error() {
                (format!("{err}\n\nPress r to retry."), COLOR_ERROR)
            } else {
                ("No posts.".to_string(), COLOR_TEXT_SECONDARY)
            };
            frame.render_widget(
                Paragraph::new(message)
                    .style(Style::default().fg(color))
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true }),
                inner,
            );
            return;
        }

        let cell_width = self.metrics.width;
        let Some(screen) = self.active_screen() else {
            return;
        };
        let visible = screen.visible_cards();
        let posts = screen.state.posts();
        for (slot, index) in (screen.offset..posts.len()).take(visible + 1).enumerate() {
            let top = inner.y + slot as u16 * CARD_HEIGHT;
            if top >= inner.bottom() {
                break;
            }
            let height = CARD_HEIGHT.min(inner.bottom() - top);
            let card_area = Rect::new(inner.x, top, inner.width, height);
            let shift = if screen.swipe_index == Some(index) {
                (screen.swipe.offset(now) / cell_width).round() as i32
            } else {
                0
            };
            draw_card(
                frame,
                card_area,
                &posts[index],
                index == screen.selected,
                shift,
                screen.can_hide,
            );
        }

        if screen.state.is_refreshing() {
            let row = Rect::new(inner.x, inner.y, inner.width, 1);
            frame.render_widget(Clear, row);
            frame.render_widget(
                Paragraph::new(format!("{} Refreshing posts…", self.spinner.frame()))
                    .style(Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_PANEL_BG))
                    .alignment(Alignment::Center),
                row,
            );
        }

        if screen.state.is_loading_more() {
            let row = Rect::new(inner.x, inner.bottom().saturating_sub(1), inner.width, 1);
            frame.render_widget(Clear, row);
            frame.render_widget(
                Paragraph::new(format!("{} Loading more…", self.spinner.frame()))
                    .style(Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_PANEL_BG))
                    .alignment(Alignment::Center),
                row,
            );
        }
    }

    fn draw_picker(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = Self::panel_block("Subreddits".to_string());
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.list_area = inner;

        let mut lines = Vec::new();
        let entries = std::iter::once("Home · top of reddit today (opens browser)".to_string())
            .chain(self.community_names.iter().map(|name| format!("r/{name}")));
        for (index, entry) in entries.enumerate() {
            let selected = index == self.communities.picker_index;
            let style = if selected {
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .bg(COLOR_PANEL_SELECTED_BG)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_PRIMARY)
            };
            let marker = if selected { "›" } else { " " };
            lines.push(Line::from(Span::styled(format!("{marker} {entry}"), style)));
            lines.push(Line::default());
        }
        frame.render_widget(Paragraph::new(Text::from(lines)), inner);
    }

    fn draw_home_prompt(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = Self::panel_block("Home".to_string());
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.list_area = inner;

        let hint = if self.session.is_loading() {
            "Restoring session…".to_string()
        } else if self.login_in_progress {
            "Waiting for authorization in your browser…".to_string()
        } else if self.session.can_sign_in() {
            "Press L to sign in.".to_string()
        } else {
            format!("Add reddit.client_id to {} to enable sign-in.", self.config_path)
        };
        let text = Text::from(vec![
            Line::from(Span::styled(
                "Sign in to see your home feed",
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                "Your subscribed subreddits will appear here",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
            Line::default(),
            Line::from(Span::styled(hint, Style::default().fg(COLOR_ACCENT))),
        ]);
        let top = inner.y + inner.height.saturating_sub(4) / 2;
        let centered = Rect::new(inner.x, top, inner.width, inner.height.min(4));
        frame.render_widget(
            Paragraph::new(text)
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true }),
            centered,
        );
    }

    fn draw_detail(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let Some(detail) = self.detail.as_ref() else {
            return;
        };
        frame.render_widget(Clear, area);
        let block = Self::panel_block(format!("{} · Esc back", detail.post.community_label()));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let width = usize::from(inner.width.saturating_sub(2)).max(10);
        let post = &detail.post;
        let media = PostMedia::from_post(post);
        let mut lines: Vec<Line<'static>> = Vec::new();
        lines.push(Line::from(Span::styled(
            meta_line(post),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));
        lines.push(Line::default());
        for row in wrap(&decode_html_entities(&post.title), width) {
            lines.push(Line::from(Span::styled(
                row.into_owned(),
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            )));
        }
        lines.push(Line::default());

        let media_line = if media.has_media_area() {
            let index = lines.len() as u16;
            lines.push(Line::from(Span::styled(
                format!("{}  (Enter to view)", media_summary(&media)),
                Style::default().fg(COLOR_ACCENT),
            )));
            lines.push(Line::default());
            Some(index)
        } else {
            None
        };

        let body = decode_html_entities(post.selftext.trim());
        if !body.is_empty() {
            for paragraph in body.lines() {
                if paragraph.trim().is_empty() {
                    lines.push(Line::default());
                    continue;
                }
                for row in wrap(paragraph, width) {
                    lines.push(Line::from(Span::styled(
                        row.into_owned(),
                        Style::default().fg(COLOR_TEXT_PRIMARY),
                    )));
                }
            }
            lines.push(Line::default());
        }
        lines.push(Line::from(Span::styled(
            stats_line(post),
            Style::default().fg(COLOR_SUCCESS),
        )));
        lines.push(Line::from(Span::styled(
            format!("o open in browser · {}", post.web_url()),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));

        let scroll = detail.scroll.min(lines.len().saturating_sub(1) as u16);
        self.detail_media_row = media_line
            .filter(|row| *row >= scroll && row - scroll < inner.height)
            .map(|row| inner.y + row - scroll);
        frame.render_widget(
            Paragraph::new(Text::from(lines)).scroll((scroll, 0)),
            inner,
        );
    }

    fn draw_image_viewer(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let now = Instant::now();
        let view = self.image_viewer.frame(now);
        if view.phase == ImagePhase::Closed {
            return;
        }
        frame.render_widget(Clear, area);
        frame.render_widget(
            Block::default().style(Style::default().bg(fade(COLOR_OVERLAY, view.opacity))),
            area,
        );

        let (screen_w, screen_h) = self.screen_px;
        let count = self.image_viewer.images().len();
        for index in 0..count {
            let Some((w, h)) = self.image_viewer.display_size(index) else {
                continue;
            };
            let left = (screen_w - w) / 2.0 + index as f64 * screen_w + view.offset_x;
            let top = (screen_h - h) / 2.0 + view.offset_y;
            if left + w <= 0.0 || left >= screen_w {
                continue;
            }
            let Some(rect) = self.px_rect(area, left, top, w, h) else {
                continue;
            };
            let image = &self.image_viewer.images()[index];
            let border = fade(COLOR_BORDER_FOCUSED, view.opacity);
            let block = Block::default()
                .title(Span::styled(
                    format!(" {}/{} ", index + 1, count),
                    Style::default().fg(border),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border));
            let label = Text::from(vec![
                Line::from(format!("Image {}×{}", image.width, image.height)),
                Line::from(truncate(&image.url, usize::from(rect.width.saturating_sub(2)))),
                Line::default(),
                Line::from("o open full size"),
            ]);
            frame.render_widget(
                Paragraph::new(label)
                    .block(block)
                    .style(Style::default().fg(fade(COLOR_TEXT_PRIMARY, view.opacity)))
                    .alignment(Alignment::Center),
                rect,
            );
        }

        if let Some(indicator) = self.image_viewer.indicator(now) {
            let mut spans: Vec<Span<'static>> = indicator
                .dots
                .iter()
                .map(|active| {
                    if *active {
                        Span::styled("● ", Style::default().fg(COLOR_ACCENT))
                    } else {
                        Span::styled("○ ", Style::default().fg(COLOR_TEXT_SECONDARY))
                    }
                })
                .collect();
            if indicator.overflow > 0 {
                spans.push(Span::styled(
                    format!("+{}", indicator.overflow),
                    Style::default().fg(COLOR_TEXT_SECONDARY),
                ));
            }
            let row = Rect::new(area.x, area.bottom().saturating_sub(1), area.width, 1);
            frame.render_widget(
                Paragraph::new(Line::from(spans)).alignment(Alignment::Center),
                row,
            );
        }
    }

    fn draw_video_viewer(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let now = Instant::now();
        let view = self.video_viewer.frame(now);
        if view.phase == VideoPhase::Closed {
            return;
        }
        frame.render_widget(Clear, area);
        frame.render_widget(
            Block::default().style(Style::default().bg(fade(COLOR_OVERLAY, view.opacity))),
            area,
        );

        let (screen_w, screen_h) = self.screen_px;
        let (mut w, mut h) = view.size;
        if w <= 0.0 || h <= 0.0 {
            w = screen_w;
            h = screen_w * 9.0 / 16.0;
        }
        let min_w = 40.0 * self.metrics.width;
        let min_h = 8.0 * self.metrics.height;
        let w = w.max(min_w).min(screen_w);
        let h = h.max(min_h).min(screen_h);
        let left = (screen_w - w) / 2.0;
        let top = (screen_h - h) / 2.0 + view.offset_y;
        let Some(rect) = self.px_rect(area, left, top, w, h) else {
            return;
        };

        let label = self
            .video_viewer
            .source()
            .map(|source| source.label.clone())
            .unwrap_or_default();
        let border = fade(COLOR_BORDER_FOCUSED, view.opacity);
        let block = Block::default()
            .title(Span::styled(
                format!(" {} ", truncate(&label, usize::from(rect.width.saturating_sub(4)))),
                Style::default().fg(border),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border));
        let inner = block.inner(rect);
        frame.render_widget(block, rect);

        let text_color = fade(COLOR_TEXT_PRIMARY, view.opacity);
        let center = Rect::new(
            inner.x,
            inner.y + inner.height.saturating_sub(1) / 2,
            inner.width,
            inner.height.min(1),
        );
        let message = match view.phase {
            VideoPhase::Loading => Span::styled(
                format!("{} Loading video…", self.spinner.frame()),
                Style::default().fg(text_color),
            ),
            VideoPhase::Error => Span::styled(
                view.error.clone().unwrap_or_default(),
                Style::default().fg(fade(COLOR_ERROR, view.opacity)),
            ),
            VideoPhase::Paused => Span::styled("Paused", Style::default().fg(text_color)),
            _ => Span::styled("Playing in the player window", Style::default().fg(text_color)),
        };
        frame.render_widget(
            Paragraph::new(Line::from(message)).alignment(Alignment::Center),
            center,
        );

        let show_controls = view.controls_visible
            && !matches!(view.phase, VideoPhase::Loading | VideoPhase::Error);
        if !show_controls || inner.height < 3 {
            return;
        }

        let bar_row = inner.bottom() - 1;
        let buttons_row = inner.bottom() - 2;
        let play_label = if view.phase == VideoPhase::Paused {
            " ▶ "
        } else {
            " ⏸ "
        };
        let back_label = " « 10s ";
        let forward_label = " 10s » ";
        let total = (back_label.width() + play_label.width() + forward_label.width() + 4) as u16;
        let mut x = inner.x + inner.width.saturating_sub(total) / 2;
        let back = Rect::new(x, buttons_row, back_label.width() as u16, 1);
        x += back.width + 2;
        let play = Rect::new(x, buttons_row, play_label.width() as u16, 1);
        x += play.width + 2;
        let forward = Rect::new(x, buttons_row, forward_label.width() as u16, 1);
        let button = Style::default()
            .fg(text_color)
            .bg(COLOR_PANEL_FOCUSED_BG)
            .add_modifier(Modifier::BOLD);
        for (rect, text) in [(back, back_label), (play, play_label), (forward, forward_label)] {
            if rect.right() <= inner.right() {
                frame.render_widget(Paragraph::new(text).style(button), rect);
            }
        }

        let left_label = format!("{} ", view.position_label);
        let right_label = format!(" {}", view.duration_label);
        let bar_width = inner
            .width
            .saturating_sub((left_label.width() + right_label.width()) as u16);
        let bar = Rect::new(
            inner.x + left_label.width() as u16,
            bar_row,
            bar_width,
            1,
        );
        let line = Line::from(vec![
            Span::styled(left_label, Style::default().fg(text_color)),
            Span::styled(
                progress_bar(view.progress, usize::from(bar_width)),
                Style::default().fg(fade(COLOR_ACCENT, view.opacity)),
            ),
            Span::styled(right_label, Style::default().fg(text_color)),
        ]);
        frame.render_widget(
            Paragraph::new(line),
            Rect::new(inner.x, bar_row, inner.width, 1),
        );

        self.video_hits = Some(VideoHitAreas {
            back,
            play,
            forward,
            bar,
        });
    }

    /// Logical-pixel rectangle relative to `area`, clipped to it.
    fn px_rect(&self, area: Rect, left: f64, top: f64, width: f64, height: f64) -> Option<Rect> {
        let x0 = (left / self.metrics.width).round();
        let y0 = (top / self.metrics.height).round();
        let x1 = ((left + width) / self.metrics.width).round();
        let y1 = ((top + height) / self.metrics.height).round();
        let x0 = x0.max(0.0).min(f64::from(area.width));
        let y0 = y0.max(0.0).min(f64::from(area.height));
        let x1 = x1.max(0.0).min(f64::from(area.width));
        let y1 = y1.max(0.0).min(f64::from(area.height));
        let w = (x1 - x0) as u16;
        let h = (y1 - y0) as u16;
        if w < 4 || h < 3 {
            return None;
        }
        Some(Rect::new(area.x + x0 as u16, area.y + y0 as u16, w, h))
    }

    fn footer_text(&self) -> String {
        if self.video_viewer.is_open() {
            return "Video: Space play/pause · ←/→ skip 10s · ,/. scrub · c controls · Esc close"
                .to_string();
        }
        if self.image_viewer.is_open() {
            return "Image: ←/→ previous/next · drag to swipe · o open · Esc close".to_string();
        }
        if self.detail.is_some() {
            return "Post: j/k scroll · Enter view media · o open in browser · Esc back"
                .to_string();
        }

        let mut parts: Vec<String> = vec!["Tab/1-3 switch tabs".to_string()];
        match self.tab {
            Tab::Subreddits if self.communities.screen.is_none() => {
                parts.push("j/k move, Enter open".to_string());
            }
            Tab::Home if !self.session.is_authenticated() => {
                parts.push("L sign in".to_string());
            }
            _ => {
                parts.push("j/k move".to_string());
                parts.push("Enter details".to_string());
                parts.push("m media".to_string());
                parts.push("o / swipe → open".to_string());
                if self.tab == Tab::Popular {
                    parts.push("h / swipe ← hide".to_string());
                }
                parts.push("r refresh".to_string());
                if self.tab == Tab::Home {
                    parts.push("X sign out".to_string());
                }
                if self.tab == Tab::Subreddits {
                    parts.push("Esc back".to_string());
                }
            }
        }
        parts.push("q quit".to_string());
        parts.join(" · ")
    }
}

fn draw_card(
    frame: &mut Frame<'_>,
    area: Rect,
    post: &Post,
    selected: bool,
    shift: i32,
    can_hide: bool,
) {
    let max_shift = i32::from(area.width / 2);
    let shift = shift.clamp(-max_shift, max_shift);
    let magnitude = shift.unsigned_abs() as u16;
    let (card, revealed) = if shift > 0 {
        (
            Rect::new(area.x + magnitude, area.y, area.width - magnitude, area.height),
            Rect::new(area.x, area.y, magnitude, area.height),
        )
    } else if shift < 0 {
        (
            Rect::new(area.x, area.y, area.width - magnitude, area.height),
            Rect::new(area.right() - magnitude, area.y, magnitude, area.height),
        )
    } else {
        (area, Rect::default())
    };

    if revealed.width > 0 {
        let (label, color) = if shift > 0 {
            ("Open", COLOR_SUCCESS)
        } else if can_hide {
            ("Hide", COLOR_ERROR)
        } else {
            ("", COLOR_PANEL_BG)
        };
        frame.render_widget(
            Paragraph::new(label)
                .style(Style::default().fg(COLOR_BG).bg(color))
                .alignment(Alignment::Center),
            revealed,
        );
    }

    let (border, background) = if selected {
        (COLOR_BORDER_FOCUSED, COLOR_PANEL_SELECTED_BG)
    } else {
        (COLOR_BORDER_IDLE, COLOR_PANEL_BG)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(background));
    let inner = block.inner(card);
    frame.render_widget(block, card);

    let width = usize::from(inner.width);
    let media = PostMedia::from_post(post);
    let lines = vec![
        Line::from(Span::styled(
            truncate(&meta_line(post), width),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )),
        Line::from(Span::styled(
            truncate(&decode_html_entities(&post.title), width),
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            truncate(&card_body(post, &media), width),
            Style::default().fg(if media.has_media_area() {
                COLOR_ACCENT
            } else {
                COLOR_TEXT_SECONDARY
            }),
        )),
        Line::from(Span::styled(
            truncate(&stats_line(post), width),
            Style::default().fg(COLOR_SUCCESS),
        )),
    ];
    frame.render_widget(Paragraph::new(Text::from(lines)), inner);
}

fn meta_line(post: &Post) -> String {
    let mut parts = vec![
        post.community_label(),
        time_ago(post.created_utc),
        format!("u/{}", post.author),
    ];
    if post.stickied {
        parts.push("pinned".to_string());
    }
    if post.over_18 {
        parts.push("NSFW".to_string());
    }
    parts.join(" · ")
}

fn stats_line(post: &Post) -> String {
    format!(
        "▲ {} · {} comments",
        format_score(post.score),
        format_score(post.num_comments)
    )
}

fn media_summary(media: &PostMedia) -> String {
    if let Some(video) = &media.video {
        return format!("▶ Video {}", format_clock(video.duration));
    }
    if media.is_gallery() {
        return format!("▣ Gallery · {} images", media.gallery.len());
    }
    match media.image.image() {
        Some(image) => format!("▣ Image {}×{}", image.width, image.height),
        None => String::new(),
    }
}

fn card_body(post: &Post, media: &PostMedia) -> String {
    if media.has_media_area() {
        return media_summary(media);
    }
    let text = decode_html_entities(post.selftext.trim());
    let first = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    if !first.is_empty() {
        return first.trim().to_string();
    }
    if !post.is_self && !post.url.is_empty() {
        return post.url.clone();
    }
    String::new()
}

/// Cuts `text` to `width` display columns, ending with `…` when shortened.
fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn progress_bar(progress: f64, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let progress = if progress.is_finite() {
        progress.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let knob = ((width - 1) as f64 * progress).round() as usize;
    let mut bar = String::with_capacity(width * 3);
    for i in 0..width {
        bar.push(match i.cmp(&knob) {
            std::cmp::Ordering::Less => '━',
            std::cmp::Ordering::Equal => '●',
            std::cmp::Ordering::Greater => '─',
        });
    }
    bar
}

fn bar_fraction(bar: Rect, column: u16) -> f64 {
    if bar.width <= 1 {
        return 0.0;
    }
    let offset = f64::from(column.saturating_sub(bar.x));
    (offset / f64::from(bar.width - 1)).clamp(0.0, 1.0)
}

fn contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x && column < area.right() && row >= area.y && row < area.bottom()
}

fn fade(color: Color, opacity: f64) -> Color {
    let opacity = opacity.clamp(0.0, 1.0);
    match color {
        Color::Rgb(r, g, b) => {
            let scale = |c: u8| (f64::from(c) * opacity).round() as u8;
            Color::Rgb(scale(r), scale(g), scale(b))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MockFeedService;
    use crate::storage::MemoryStore;
    use ratatui::backend::TestBackend;

    fn model() -> Model {
        let session = Arc::new(session::Manager::new(Arc::new(MemoryStore::new()), None));
        let mut model = Model::new(Options {
            status_message: String::new(),
            feed_service: Arc::new(MockFeedService),
            session,
            communities: vec!["ClaudeAI".into(), "codex".into()],
            home_url: "https://reddit.com/top/?sort=top&t=day".into(),
            viewer: ViewerConfig::default(),
            mpv: MpvOptions::default(),
            config_path: "~/.config/lurk/config.yaml".into(),
        });
        model.metrics = CellMetrics {
            width: FALLBACK_CELL_WIDTH,
            height: FALLBACK_CELL_HEIGHT,
        };
        settle(&mut model);
        model
    }

    fn settle(model: &mut Model) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            model.poll_async();
            if !model.is_loading() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn draw(model: &mut Model) {
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal.draw(|frame| model.draw(frame)).unwrap();
    }

    fn screen_text(model: &mut Model) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal.draw(|frame| model.draw(frame)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: crossterm::event::KeyModifiers::NONE,
        }
    }

    #[test]
    fn popular_loads_and_hides() {
        let mut model = model();
        assert_eq!(model.popular.state.posts().len(), 5);
        assert_eq!(model.session.state(), AuthState::SignedOut);
        model.handle_key(KeyCode::Char('h')).unwrap();
        assert_eq!(model.popular.state.posts().len(), 4);
        assert!(model.status_message.starts_with("Hidden:"));
    }

    #[test]
    fn refresh_keeps_posts_and_shows_banner() {
        let mut model = model();
        model.handle_key(KeyCode::Char('r')).unwrap();
        assert_eq!(model.popular.state.posts().len(), 5);
        assert!(screen_text(&mut model).contains("Refreshing posts"));
        settle(&mut model);
        assert!(!screen_text(&mut model).contains("Refreshing posts"));
        assert_eq!(model.popular.state.posts().len(), 5);
    }

    #[test]
    fn picker_opens_community_and_tab_reset_returns() {
        let mut model = model();
        model.handle_key(KeyCode::Char('2')).unwrap();
        model.handle_key(KeyCode::Down).unwrap();
        model.handle_key(KeyCode::Enter).unwrap();
        let slot = model.communities.screen.as_ref().map(|s| s.slot.clone());
        assert_eq!(slot, Some(FeedSlot::Community("ClaudeAI".into())));
        settle(&mut model);
        assert_eq!(model.active_screen().map(|s| s.state.posts().len()), Some(5));
        // no hide outside Popular
        model.handle_key(KeyCode::Char('h')).unwrap();
        assert_eq!(model.active_screen().map(|s| s.state.posts().len()), Some(5));

        model.handle_key(KeyCode::Char('2')).unwrap();
        assert!(model.communities.screen.is_none());
    }

    #[test]
    fn picker_home_entry_opens_browser_url() {
        let mut model = model();
        model.handle_key(KeyCode::Char('2')).unwrap();
        model.handle_key(KeyCode::Enter).unwrap();
        assert!(model.communities.screen.is_none());
        assert_eq!(
            model.status_message,
            "Opened https://reddit.com/top/?sort=top&t=day"
        );
    }

    #[test]
    fn home_prompts_for_sign_in() {
        let mut model = model();
        model.handle_key(KeyCode::Char('3')).unwrap();
        assert!(model.active_screen().is_none());
        model.handle_key(KeyCode::Char('L')).unwrap();
        assert!(model.status_message.contains("reddit.client_id"));
        assert!(!model.login_in_progress);
    }

    #[test]
    fn right_swipe_on_card_opens_permalink() {
        let mut model = model();
        draw(&mut model);
        let row = model.list_area.y + 1;
        let column = model.list_area.x + 5;
        model
            .handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), column, row))
            .unwrap();
        model
            .handle_mouse(mouse(MouseEventKind::Drag(MouseButton::Left), column + 20, row))
            .unwrap();
        model
            .handle_mouse(mouse(MouseEventKind::Up(MouseButton::Left), column + 20, row))
            .unwrap();
        assert_eq!(
            model.status_message,
            "Opened https://www.reddit.com/r/lurk/comments/mock0/"
        );
        assert_eq!(model.popular.state.posts().len(), 5);
    }

    #[test]
    fn tap_on_card_opens_detail() {
        let mut model = model();
        draw(&mut model);
        let row = model.list_area.y + 1;
        let column = model.list_area.x + 5;
        model
            .handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), column, row))
            .unwrap();
        model
            .handle_mouse(mouse(MouseEventKind::Up(MouseButton::Left), column + 1, row))
            .unwrap();
        assert_eq!(model.detail.as_ref().map(|d| d.post.id.as_str()), Some("mock0"));
        model.handle_key(KeyCode::Esc).unwrap();
        assert!(model.detail.is_none());
    }

    #[test]
    fn truncate_respects_width() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 6), "hello…");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn progress_bar_places_knob() {
        assert_eq!(progress_bar(0.0, 5), "●────");
        assert_eq!(progress_bar(1.0, 5), "━━━━●");
        assert_eq!(progress_bar(0.5, 5), "━━●──");
        assert_eq!(progress_bar(f64::NAN, 3), "●──");
    }

    #[test]
    fn fade_scales_rgb() {
        assert_eq!(fade(Color::Rgb(200, 100, 50), 0.5), Color::Rgb(100, 50, 25));
        assert_eq!(fade(Color::Rgb(200, 100, 50), 2.0), Color::Rgb(200, 100, 50));
    }
}
