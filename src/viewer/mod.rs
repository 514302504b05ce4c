//! Headless media viewers.
//!
//! Both viewers are plain state machines fed with gesture deltas in logical
//! pixels and an explicit `Instant`. The terminal layer converts mouse and key
//! events into these calls and renders whatever `frame` reports.

pub mod animation;
pub mod image;
pub mod video;

use std::time::{Duration, Instant};

use animation::{AnimatedValue, Motion};

pub use image::{ImageFrame, ImageViewer, ImagePhase, Indicator};
pub use video::{Playback, PlaybackStatus, VideoFrame, VideoPhase, VideoViewer};

/// Dimensions and gesture constants shared by the viewers.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub screen_width: f64,
    pub screen_height: f64,
    pub swipe_threshold: f64,
    pub dismiss_threshold: f64,
    pub page_duration: Duration,
    pub fade_duration: Duration,
    /// Share of the screen height at which a dismiss drag reaches full transparency.
    pub fade_fraction: f64,
    pub max_height_fraction: f64,
    pub controls_timeout: Duration,
    pub skip_seconds: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            screen_width: 390.0,
            screen_height: 844.0,
            swipe_threshold: 50.0,
            dismiss_threshold: 100.0,
            page_duration: Duration::from_millis(250),
            fade_duration: Duration::from_millis(200),
            fade_fraction: 0.4,
            max_height_fraction: 0.8,
            controls_timeout: Duration::from_secs(2),
            skip_seconds: 10.0,
        }
    }
}

impl ViewerConfig {
    pub fn with_screen(mut self, width: f64, height: f64) -> Self {
        self.screen_width = width.max(1.0);
        self.screen_height = height.max(1.0);
        self
    }
}

/// Scales media to fill the screen width, capped at a share of the screen
/// height. Missing dimensions are treated as square.
pub fn fit_to_screen(width: i64, height: i64, cfg: &ViewerConfig) -> (f64, f64) {
    let aspect = if width > 0 && height > 0 {
        width as f64 / height as f64
    } else {
        1.0
    };
    let max_height = cfg.screen_height * cfg.max_height_fraction;
    let fitted_width = cfg.screen_width;
    let fitted_height = fitted_width / aspect;
    if fitted_height > max_height {
        (max_height * aspect, max_height)
    } else {
        (fitted_width, fitted_height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissOutcome {
    Dismiss,
    SpringBack,
}

/// The downward drag-to-dismiss gesture used by both viewers.
#[derive(Debug, Clone, Default)]
pub struct DismissDrag {
    offset: AnimatedValue,
    fade: Option<(Instant, Duration, f64)>,
}

impl DismissDrag {
    pub fn update(&mut self, dy: f64) {
        self.offset.set(dy.max(0.0));
    }

    /// Strictly past the threshold dismisses; anything else springs back.
    pub fn release(&mut self, dy: f64, cfg: &ViewerConfig, now: Instant) -> DismissOutcome {
        let dy = dy.max(0.0);
        if dy > cfg.dismiss_threshold {
            self.offset.set(dy);
            self.begin_fade(cfg, now);
            DismissOutcome::Dismiss
        } else {
            self.offset.set(dy);
            self.offset.animate_to(0.0, Motion::Spring, now);
            DismissOutcome::SpringBack
        }
    }

    /// Fades out from wherever the overlay currently is.
    pub fn begin_fade(&mut self, cfg: &ViewerConfig, now: Instant) {
        if self.fade.is_none() {
            self.fade = Some((now, cfg.fade_duration, self.opacity(now, cfg)));
        }
    }

    pub fn offset(&self, now: Instant) -> f64 {
        self.offset.value_at(now)
    }

    /// Linear in the drag offset, clamped to `[0, 1]`; fades out once dismissed.
    pub fn opacity(&self, now: Instant, cfg: &ViewerConfig) -> f64 {
        if let Some((start, duration, from)) = self.fade {
            let elapsed = now.saturating_duration_since(start);
            if duration.is_zero() || elapsed >= duration {
                return 0.0;
            }
            let remaining = 1.0 - elapsed.as_secs_f64() / duration.as_secs_f64();
            return (from * remaining).clamp(0.0, 1.0);
        }
        let fade_distance = cfg.screen_height * cfg.fade_fraction;
        if fade_distance <= 0.0 {
            return 1.0;
        }
        (1.0 - self.offset(now) / fade_distance).clamp(0.0, 1.0)
    }

    pub fn fade_finished(&self, now: Instant) -> bool {
        match self.fade {
            Some((start, duration, _)) => now.saturating_duration_since(start) >= duration,
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.offset.set(0.0);
        self.fade = None;
    }
}
