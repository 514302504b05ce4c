use std::time::Instant;

use tracing::debug;

use super::animation::{AnimatedValue, Motion};
use super::{fit_to_screen, DismissDrag, DismissOutcome, ViewerConfig};
use crate::media::ImageSource;

const MAX_DOTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePhase {
    Closed,
    Idle,
    DraggingHorizontal,
    DraggingVertical,
    AnimatingToIndex,
    Dismissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

/// What a finished gesture did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Ignored,
    Paged { index: usize },
    Stayed,
    SpringBack,
    Dismissed,
}

/// Snapshot for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub phase: ImagePhase,
    pub offset_x: f64,
    pub offset_y: f64,
    pub opacity: f64,
    pub active_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    /// Visible dots, `true` for the active one.
    pub dots: Vec<bool>,
    /// Images not represented by a dot.
    pub overflow: usize,
}

#[derive(Debug, Clone)]
pub struct ImageViewer {
    cfg: ViewerConfig,
    images: Vec<ImageSource>,
    index: usize,
    phase: ImagePhase,
    axis: Option<Axis>,
    base_x: AnimatedValue,
    drag_x: f64,
    dismiss: DismissDrag,
}

impl ImageViewer {
    pub fn new(cfg: ViewerConfig) -> Self {
        Self {
            cfg,
            images: Vec::new(),
            index: 0,
            phase: ImagePhase::Closed,
            axis: None,
            base_x: AnimatedValue::default(),
            drag_x: 0.0,
            dismiss: DismissDrag::default(),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.cfg
    }

    /// Screen size changes keep the current image in place.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.cfg = self.cfg.clone().with_screen(width, height);
        self.base_x.set(self.page_offset(self.index));
    }

    pub fn phase(&self) -> ImagePhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase != ImagePhase::Closed
    }

    pub fn images(&self) -> &[ImageSource] {
        &self.images
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Opens at `start` (clamped). An empty list leaves the viewer closed.
    pub fn open(&mut self, images: Vec<ImageSource>, start: usize) -> bool {
        if images.is_empty() {
            return false;
        }
        self.index = start.min(images.len() - 1);
        self.images = images;
        self.axis = None;
        self.drag_x = 0.0;
        self.base_x.set(self.page_offset(self.index));
        self.dismiss.reset();
        self.phase = ImagePhase::Idle;
        debug!(count = self.images.len(), index = self.index, "image viewer: open");
        true
    }

    pub fn close(&mut self) {
        self.phase = ImagePhase::Closed;
        self.images.clear();
        self.index = 0;
        self.axis = None;
        self.drag_x = 0.0;
        self.base_x.set(0.0);
        self.dismiss.reset();
    }

    /// Feeds the cumulative translation of the gesture in progress.
    pub fn drag_update(&mut self, dx: f64, dy: f64, now: Instant) {
        if !self.accepts_gestures() {
            return;
        }
        let axis = match self.axis {
            Some(axis) => axis,
            None => {
                if dx == 0.0 && dy == 0.0 {
                    return;
                }
                if self.phase == ImagePhase::AnimatingToIndex {
                    self.base_x.freeze(now);
                }
                let axis = if self.images.len() > 1 && dx.abs() > dy.abs() {
                    Axis::Horizontal
                } else {
                    Axis::Vertical
                };
                self.axis = Some(axis);
                axis
            }
        };
        match axis {
            Axis::Horizontal => {
                self.phase = ImagePhase::DraggingHorizontal;
                self.drag_x = dx;
            }
            Axis::Vertical => {
                self.phase = ImagePhase::DraggingVertical;
                self.dismiss.update(dy);
            }
        }
    }

    /// Ends the gesture. A release that never moved counts as a tap.
    pub fn drag_end(&mut self, dx: f64, dy: f64, now: Instant) -> Release {
        if !self.accepts_gestures() {
            return Release::Ignored;
        }
        match self.axis.take() {
            None => {
                self.tap(now);
                Release::Dismissed
            }
            Some(Axis::Horizontal) => self.release_horizontal(dx, now),
            Some(Axis::Vertical) => self.release_vertical(dy, now),
        }
    }

    /// A plain tap closes the viewer.
    pub fn tap(&mut self, now: Instant) {
        if !self.accepts_gestures() {
            return;
        }
        self.axis = None;
        self.dismiss.begin_fade(&self.cfg, now);
        self.phase = ImagePhase::Dismissing;
    }

    /// Steps to the neighbouring image as if swiped past the threshold.
    pub fn step(&mut self, forward: bool, now: Instant) -> Release {
        let dx = self.cfg.swipe_threshold + 1.0;
        let dx = if forward { -dx } else { dx };
        self.drag_update(dx, 0.0, now);
        self.drag_end(dx, 0.0, now)
    }

    /// Advances time-driven transitions.
    pub fn tick(&mut self, now: Instant) {
        match self.phase {
            ImagePhase::AnimatingToIndex if !self.base_x.is_animating(now) => {
                self.phase = ImagePhase::Idle;
            }
            ImagePhase::Dismissing if self.dismiss.fade_finished(now) => {
                debug!("image viewer: closed");
                self.close();
            }
            _ => {}
        }
    }

    pub fn frame(&self, now: Instant) -> ImageFrame {
        ImageFrame {
            phase: self.phase,
            offset_x: self.combined_offset(now),
            offset_y: self.dismiss.offset(now),
            opacity: if self.is_open() {
                self.dismiss.opacity(now, &self.cfg)
            } else {
                0.0
            },
            active_index: self.active_index(now),
        }
    }

    /// Index of the image within half a screen width of the current offset.
    pub fn active_index(&self, now: Instant) -> usize {
        if self.images.is_empty() {
            return 0;
        }
        let position = -self.combined_offset(now) / self.cfg.screen_width;
        let nearest = position.round().max(0.0) as usize;
        nearest.min(self.images.len() - 1)
    }

    /// Only shown for more than one image.
    pub fn indicator(&self, now: Instant) -> Option<Indicator> {
        let count = self.images.len();
        if count < 2 {
            return None;
        }
        let active = self.active_index(now);
        let visible = count.min(MAX_DOTS);
        let start = active.saturating_sub(MAX_DOTS / 2).min(count - visible);
        Some(Indicator {
            dots: (start..start + visible).map(|i| i == active).collect(),
            overflow: count - visible,
        })
    }

    /// Displayed size of the image at `index`.
    pub fn display_size(&self, index: usize) -> Option<(f64, f64)> {
        let image = self.images.get(index)?;
        Some(fit_to_screen(image.width, image.height, &self.cfg))
    }

    fn accepts_gestures(&self) -> bool {
        !matches!(self.phase, ImagePhase::Closed | ImagePhase::Dismissing)
    }

    fn page_offset(&self, index: usize) -> f64 {
        -(index as f64) * self.cfg.screen_width
    }

    fn combined_offset(&self, now: Instant) -> f64 {
        self.base_x.value_at(now) + self.drag_x
    }

    fn release_horizontal(&mut self, dx: f64, now: Instant) -> Release {
        let last = self.images.len() - 1;
        let threshold = self.cfg.swipe_threshold;
        let next = if dx < -threshold && self.index < last {
            self.index + 1
        } else if dx > threshold && self.index > 0 {
            self.index - 1
        } else {
            self.index
        };
        let moved = next != self.index;
        self.index = next;

        let from = self.base_x.value_at(now) + dx;
        self.drag_x = 0.0;
        self.base_x.set(from);
        self.animate_to_index(now);
        if moved {
            debug!(index = next, "image viewer: paged");
            Release::Paged { index: next }
        } else {
            Release::Stayed
        }
    }

    fn release_vertical(&mut self, dy: f64, now: Instant) -> Release {
        match self.dismiss.release(dy, &self.cfg, now) {
            DismissOutcome::Dismiss => {
                self.phase = ImagePhase::Dismissing;
                Release::Dismissed
            }
            DismissOutcome::SpringBack => {
                self.animate_to_index(now);
                Release::SpringBack
            }
        }
    }

    fn animate_to_index(&mut self, now: Instant) {
        let target = self.page_offset(self.index);
        self.base_x
            .animate_to(target, Motion::Timing(self.cfg.page_duration), now);
        self.phase = if self.base_x.is_animating(now) {
            ImagePhase::AnimatingToIndex
        } else {
            ImagePhase::Idle
        };
    }
}
