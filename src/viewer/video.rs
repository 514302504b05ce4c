use std::time::Instant;

use anyhow::Result;
use tracing::{debug, warn};

use super::{fit_to_screen, DismissDrag, DismissOutcome, ViewerConfig};
use crate::format::format_clock;
use crate::media::VideoSource;
use crate::timer::Deferred;

pub const PLAYBACK_FAILED: &str = "Failed to load video";

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackStatus {
    Loading,
    Ready,
    Failed(String),
}

/// The player behind the video viewer.
pub trait Playback: Send {
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    /// Absolute seek in seconds.
    fn seek_to(&mut self, seconds: f64) -> Result<()>;
    fn status(&mut self) -> PlaybackStatus;
    fn position(&mut self) -> Option<f64>;
    fn duration(&mut self) -> Option<f64>;
    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPhase {
    Closed,
    Loading,
    Playing,
    Paused,
    Scrubbing,
    Error,
    Dismissing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub phase: VideoPhase,
    pub controls_visible: bool,
    /// Scrub preview while scrubbing, playback position otherwise.
    pub position: f64,
    pub duration: f64,
    pub progress: f64,
    pub position_label: String,
    pub duration_label: String,
    pub offset_y: f64,
    pub opacity: f64,
    pub size: (f64, f64),
    pub error: Option<String>,
}

pub struct VideoViewer {
    cfg: ViewerConfig,
    phase: VideoPhase,
    source: Option<VideoSource>,
    player: Option<Box<dyn Playback>>,
    controls_visible: bool,
    hide_controls: Deferred,
    position: f64,
    duration: f64,
    scrub: Option<Scrub>,
    dragging: bool,
    dismiss: DismissDrag,
    error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Scrub {
    preview: f64,
    resume: bool,
}

impl VideoViewer {
    pub fn new(cfg: ViewerConfig) -> Self {
        Self {
            cfg,
            phase: VideoPhase::Closed,
            source: None,
            player: None,
            controls_visible: false,
            hide_controls: Deferred::new(),
            position: 0.0,
            duration: 0.0,
            scrub: None,
            dragging: false,
            dismiss: DismissDrag::default(),
            error: None,
        }
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.cfg = self.cfg.clone().with_screen(width, height);
    }

    pub fn phase(&self) -> VideoPhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase != VideoPhase::Closed
    }

    pub fn source(&self) -> Option<&VideoSource> {
        self.source.as_ref()
    }

    pub fn controls_visible(&self) -> bool {
        self.controls_visible
    }

    /// Starts playback right away with the controls showing.
    pub fn open(&mut self, source: VideoSource, mut player: Box<dyn Playback>, now: Instant) {
        self.close();
        debug!(url = %source.url, "video viewer: open");
        self.duration = source.duration.max(0.0);
        self.source = Some(source);
        self.controls_visible = true;
        self.phase = VideoPhase::Loading;
        if let Err(err) = player.play() {
            warn!(error = %format!("{err:#}"), "video viewer: play failed");
            self.player = Some(player);
            self.fail(format!("{err:#}"));
            return;
        }
        self.player = Some(player);
        self.tick(now);
    }

    /// Pauses, releases the player and resets the dismiss offset.
    pub fn close(&mut self) {
        if let Some(mut player) = self.player.take() {
            if let Err(err) = player.pause() {
                debug!(error = %format!("{err:#}"), "video viewer: pause on close");
            }
            player.stop();
        }
        self.phase = VideoPhase::Closed;
        self.source = None;
        self.controls_visible = false;
        self.hide_controls.cancel();
        self.position = 0.0;
        self.duration = 0.0;
        self.scrub = None;
        self.dragging = false;
        self.dismiss.reset();
        self.error = None;
    }

    pub fn tick(&mut self, now: Instant) {
        match self.phase {
            VideoPhase::Closed | VideoPhase::Error => return,
            VideoPhase::Dismissing => {
                if self.dismiss.fade_finished(now) {
                    debug!("video viewer: closed");
                    self.close();
                }
                return;
            }
            _ => {}
        }
        let Some(player) = self.player.as_mut() else {
            return;
        };
        match player.status() {
            PlaybackStatus::Failed(reason) => {
                self.fail(reason);
                return;
            }
            PlaybackStatus::Loading => {}
            PlaybackStatus::Ready => {
                if self.phase == VideoPhase::Loading {
                    self.phase = VideoPhase::Playing;
                    self.hide_controls.schedule(now, self.cfg.controls_timeout);
                }
                if let Some(position) = player.position() {
                    self.position = position.max(0.0);
                }
                if let Some(duration) = player.duration().filter(|d| d.is_finite() && *d > 0.0) {
                    self.duration = duration;
                }
            }
        }
        if self.hide_controls.fire_if_due(now) && self.phase == VideoPhase::Playing {
            self.controls_visible = false;
        }
    }

    pub fn toggle_play(&mut self, now: Instant) {
        let next = match self.phase {
            VideoPhase::Playing => VideoPhase::Paused,
            VideoPhase::Paused => VideoPhase::Playing,
            _ => return,
        };
        let result = match self.player.as_mut() {
            Some(player) if next == VideoPhase::Paused => player.pause(),
            Some(player) => player.play(),
            None => return,
        };
        if let Err(err) = result {
            warn!(error = %format!("{err:#}"), "video viewer: toggle failed");
            return;
        }
        self.phase = next;
        self.interact(now);
    }

    /// Relative skip, clamped to the known duration.
    pub fn skip(&mut self, forward: bool, now: Instant) {
        if !matches!(self.phase, VideoPhase::Playing | VideoPhase::Paused) {
            return;
        }
        let delta = if forward {
            self.cfg.skip_seconds
        } else {
            -self.cfg.skip_seconds
        };
        let target = self.clamp_time(self.position + delta);
        if let Some(player) = self.player.as_mut() {
            if let Err(err) = player.seek_to(target) {
                warn!(error = %format!("{err:#}"), "video viewer: skip failed");
                return;
            }
            self.position = target;
        }
        self.interact(now);
    }

    pub fn begin_scrub(&mut self) {
        if !matches!(self.phase, VideoPhase::Playing | VideoPhase::Paused) {
            return;
        }
        self.scrub = Some(Scrub {
            preview: self.position,
            resume: self.phase == VideoPhase::Playing,
        });
        self.phase = VideoPhase::Scrubbing;
        self.controls_visible = true;
        self.hide_controls.cancel();
    }

    /// Moves the preview only; playback keeps its position.
    pub fn scrub_to(&mut self, fraction: f64) {
        let duration = self.duration;
        if let Some(scrub) = self.scrub.as_mut() {
            let fraction = if fraction.is_finite() {
                fraction.clamp(0.0, 1.0)
            } else {
                0.0
            };
            scrub.preview = fraction * duration;
        }
    }

    /// Commits the previewed position.
    pub fn end_scrub(&mut self, now: Instant) {
        let Some(scrub) = self.scrub.take() else {
            return;
        };
        let target = self.clamp_time(scrub.preview);
        if let Some(player) = self.player.as_mut() {
            match player.seek_to(target) {
                Ok(()) => self.position = target,
                Err(err) => warn!(error = %format!("{err:#}"), "video viewer: seek failed"),
            }
        }
        self.phase = if scrub.resume {
            VideoPhase::Playing
        } else {
            VideoPhase::Paused
        };
        self.interact(now);
    }

    /// A tap on the video area toggles the controls.
    pub fn tap_video(&mut self, now: Instant) {
        if !matches!(self.phase, VideoPhase::Playing | VideoPhase::Paused) {
            return;
        }
        if self.controls_visible {
            self.controls_visible = false;
            self.hide_controls.cancel();
        } else {
            self.interact(now);
        }
    }

    pub fn drag_update(&mut self, dy: f64) {
        if !self.accepts_gestures() {
            return;
        }
        self.dragging = true;
        self.dismiss.update(dy);
    }

    /// Ends a drag on the video area. A release without movement is a tap.
    pub fn drag_end(&mut self, dy: f64, now: Instant) -> DismissOutcome {
        if !self.accepts_gestures() {
            return DismissOutcome::SpringBack;
        }
        if !std::mem::take(&mut self.dragging) {
            self.tap_video(now);
            return DismissOutcome::SpringBack;
        }
        let outcome = self.dismiss.release(dy, &self.cfg, now);
        if outcome == DismissOutcome::Dismiss {
            self.begin_dismiss(now);
        }
        outcome
    }

    /// Closes with the fade-out, pausing right away.
    pub fn dismiss(&mut self, now: Instant) {
        if !self.accepts_gestures() && self.phase != VideoPhase::Error {
            return;
        }
        self.dismiss.begin_fade(&self.cfg, now);
        self.begin_dismiss(now);
    }

    pub fn frame(&self, now: Instant) -> VideoFrame {
        let position = match (self.phase, self.scrub) {
            (VideoPhase::Scrubbing, Some(scrub)) => scrub.preview,
            _ => self.position,
        };
        let progress = if self.duration > 0.0 {
            (position / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let size = self
            .source
            .as_ref()
            .map(|source| fit_to_screen(source.width, source.height, &self.cfg))
            .unwrap_or((0.0, 0.0));
        VideoFrame {
            phase: self.phase,
            controls_visible: self.controls_visible,
            position,
            duration: self.duration,
            progress,
            position_label: format_clock(position),
            duration_label: format_clock(self.duration),
            offset_y: self.dismiss.offset(now),
            opacity: if self.is_open() {
                self.dismiss.opacity(now, &self.cfg)
            } else {
                0.0
            },
            size,
            error: self.error.clone(),
        }
    }

    fn accepts_gestures(&self) -> bool {
        !matches!(self.phase, VideoPhase::Closed | VideoPhase::Dismissing)
    }

    fn begin_dismiss(&mut self, now: Instant) {
        if let Some(player) = self.player.as_mut() {
            if let Err(err) = player.pause() {
                debug!(error = %format!("{err:#}"), "video viewer: pause on dismiss");
            }
        }
        self.scrub = None;
        self.hide_controls.cancel();
        self.phase = VideoPhase::Dismissing;
        self.tick(now);
    }

    /// Restarts the idle countdown after any interaction.
    fn interact(&mut self, now: Instant) {
        self.controls_visible = true;
        if self.phase == VideoPhase::Playing {
            self.hide_controls.schedule(now, self.cfg.controls_timeout);
        } else {
            self.hide_controls.cancel();
        }
    }

    fn fail(&mut self, reason: String) {
        warn!(%reason, "video viewer: playback failed");
        if let Some(player) = self.player.as_mut() {
            player.stop();
        }
        self.phase = VideoPhase::Error;
        self.error = Some(PLAYBACK_FAILED.to_string());
        self.controls_visible = false;
        self.hide_controls.cancel();
        self.scrub = None;
    }

    fn clamp_time(&self, seconds: f64) -> f64 {
        let upper = if self.duration > 0.0 {
            self.duration
        } else {
            f64::MAX
        };
        seconds.clamp(0.0, upper)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::anyhow;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct Calls {
        played: usize,
        paused: usize,
        seeks: Vec<f64>,
        stopped: bool,
    }

    struct FakePlayback {
        calls: Arc<Mutex<Calls>>,
        status: Arc<Mutex<PlaybackStatus>>,
        position: f64,
    }

    impl Playback for FakePlayback {
        fn play(&mut self) -> Result<()> {
            self.calls.lock().played += 1;
            Ok(())
        }
        fn pause(&mut self) -> Result<()> {
            self.calls.lock().paused += 1;
            Ok(())
        }
        fn seek_to(&mut self, seconds: f64) -> Result<()> {
            self.calls.lock().seeks.push(seconds);
            self.position = seconds;
            Ok(())
        }
        fn status(&mut self) -> PlaybackStatus {
            self.status.lock().clone()
        }
        fn position(&mut self) -> Option<f64> {
            Some(self.position)
        }
        fn duration(&mut self) -> Option<f64> {
            Some(60.0)
        }
        fn stop(&mut self) {
            self.calls.lock().stopped = true;
        }
    }

    struct Harness {
        viewer: VideoViewer,
        calls: Arc<Mutex<Calls>>,
        status: Arc<Mutex<PlaybackStatus>>,
        start: Instant,
    }

    fn source() -> VideoSource {
        VideoSource {
            url: "https://v.redd.it/x/DASH_720.mp4".into(),
            width: 1280,
            height: 720,
            duration: 60.0,
            label: "clip".into(),
        }
    }

    fn harness(position: f64) -> Harness {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let status = Arc::new(Mutex::new(PlaybackStatus::Loading));
        let start = Instant::now();
        let mut viewer = VideoViewer::new(ViewerConfig::default());
        viewer.open(
            source(),
            Box::new(FakePlayback {
                calls: calls.clone(),
                status: status.clone(),
                position,
            }),
            start,
        );
        Harness {
            viewer,
            calls,
            status,
            start,
        }
    }

    fn ready(h: &mut Harness) {
        *h.status.lock() = PlaybackStatus::Ready;
        h.viewer.tick(h.start);
    }

    fn at(h: &Harness, ms: u64) -> Instant {
        h.start + Duration::from_millis(ms)
    }

    #[test]
    fn opens_loading_and_autoplays() {
        let mut h = harness(0.0);
        assert_eq!(h.viewer.phase(), VideoPhase::Loading);
        assert!(h.viewer.controls_visible());
        assert_eq!(h.calls.lock().played, 1);
        ready(&mut h);
        assert_eq!(h.viewer.phase(), VideoPhase::Playing);
    }

    #[test]
    fn controls_hide_after_idle_while_playing() {
        let mut h = harness(0.0);
        ready(&mut h);
        h.viewer.tick(at(&h, 1999));
        assert!(h.viewer.controls_visible());
        h.viewer.tick(at(&h, 2000));
        assert!(!h.viewer.controls_visible());
    }

    #[test]
    fn interaction_restarts_the_idle_timer() {
        let mut h = harness(0.0);
        ready(&mut h);
        h.viewer.skip(true, at(&h, 1500));
        h.viewer.tick(at(&h, 2500));
        assert!(h.viewer.controls_visible());
        h.viewer.tick(at(&h, 3500));
        assert!(!h.viewer.controls_visible());
    }

    #[test]
    fn paused_keeps_controls() {
        let mut h = harness(0.0);
        ready(&mut h);
        h.viewer.toggle_play(at(&h, 100));
        assert_eq!(h.viewer.phase(), VideoPhase::Paused);
        h.viewer.tick(at(&h, 10_000));
        assert!(h.viewer.controls_visible());
        h.viewer.toggle_play(at(&h, 10_000));
        assert_eq!(h.viewer.phase(), VideoPhase::Playing);
        assert_eq!(h.calls.lock().played, 2);
    }

    #[test]
    fn skip_is_clamped() {
        let mut h = harness(55.0);
        ready(&mut h);
        h.viewer.skip(true, at(&h, 10));
        h.viewer.skip(false, at(&h, 20));
        h.viewer.skip(false, at(&h, 30));
        h.viewer.skip(false, at(&h, 40));
        h.viewer.skip(false, at(&h, 50));
        h.viewer.skip(false, at(&h, 60));
        h.viewer.skip(false, at(&h, 70));
        h.viewer.skip(false, at(&h, 80));
        assert_eq!(
            h.calls.lock().seeks,
            vec![60.0, 50.0, 40.0, 30.0, 20.0, 10.0, 0.0, 0.0]
        );
    }

    #[test]
    fn scrub_previews_then_commits_on_release() {
        let mut h = harness(12.0);
        ready(&mut h);
        h.viewer.begin_scrub();
        h.viewer.scrub_to(0.5);
        let frame = h.viewer.frame(at(&h, 20));
        assert_eq!(frame.phase, VideoPhase::Scrubbing);
        assert_eq!(frame.position, 30.0);
        assert_eq!(frame.position_label, "0:30");
        assert!(h.calls.lock().seeks.is_empty());

        h.viewer.end_scrub(at(&h, 30));
        assert_eq!(h.calls.lock().seeks, vec![30.0]);
        assert_eq!(h.viewer.phase(), VideoPhase::Playing);
    }

    #[test]
    fn tap_toggles_controls() {
        let mut h = harness(0.0);
        ready(&mut h);
        h.viewer.drag_end(0.0, at(&h, 10));
        assert!(!h.viewer.controls_visible());
        h.viewer.drag_end(0.0, at(&h, 20));
        assert!(h.viewer.controls_visible());
    }

    #[test]
    fn drag_past_threshold_pauses_and_closes() {
        let mut h = harness(0.0);
        ready(&mut h);
        h.viewer.drag_update(101.0);
        assert_eq!(h.viewer.drag_end(101.0, at(&h, 10)), DismissOutcome::Dismiss);
        assert_eq!(h.viewer.phase(), VideoPhase::Dismissing);
        assert_eq!(h.calls.lock().paused, 1);
        h.viewer.tick(at(&h, 300));
        assert!(!h.viewer.is_open());
        assert!(h.calls.lock().stopped);
        assert_eq!(h.viewer.frame(at(&h, 300)).offset_y, 0.0);
    }

    #[test]
    fn drag_at_threshold_springs_back() {
        let mut h = harness(0.0);
        ready(&mut h);
        h.viewer.drag_update(100.0);
        assert_eq!(h.viewer.drag_end(100.0, at(&h, 10)), DismissOutcome::SpringBack);
        assert_eq!(h.viewer.phase(), VideoPhase::Playing);
        assert_eq!(h.viewer.frame(at(&h, 1000)).offset_y, 0.0);
    }

    #[test]
    fn failure_shows_error() {
        let mut h = harness(0.0);
        *h.status.lock() = PlaybackStatus::Failed("exit status 2".into());
        h.viewer.tick(at(&h, 10));
        let frame = h.viewer.frame(at(&h, 10));
        assert_eq!(frame.phase, VideoPhase::Error);
        assert_eq!(frame.error.as_deref(), Some(PLAYBACK_FAILED));
        assert!(!frame.controls_visible);
        h.viewer.dismiss(at(&h, 20));
        h.viewer.tick(at(&h, 500));
        assert!(!h.viewer.is_open());
    }

    #[test]
    fn play_error_on_open_is_an_error_state() {
        struct Broken;
        impl Playback for Broken {
            fn play(&mut self) -> Result<()> {
                Err(anyhow!("mpv missing"))
            }
            fn pause(&mut self) -> Result<()> {
                Ok(())
            }
            fn seek_to(&mut self, _: f64) -> Result<()> {
                Ok(())
            }
            fn status(&mut self) -> PlaybackStatus {
                PlaybackStatus::Loading
            }
            fn position(&mut self) -> Option<f64> {
                None
            }
            fn duration(&mut self) -> Option<f64> {
                None
            }
            fn stop(&mut self) {}
        }
        let mut viewer = VideoViewer::new(ViewerConfig::default());
        viewer.open(source(), Box::new(Broken), Instant::now());
        assert_eq!(viewer.phase(), VideoPhase::Error);
    }
}
