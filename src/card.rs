use std::time::Instant;

use crate::viewer::animation::{AnimatedValue, Motion};

pub const ACTIVATION_OFFSET: f64 = 20.0;
pub const ACTION_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeAction {
    /// Released before the swipe ever activated.
    Tap,
    OpenExternal,
    Hide,
    Cancelled,
}

/// Horizontal swipe on a post card. The card follows the pointer once the
/// swipe activates and always springs back on release.
#[derive(Debug, Clone, Default)]
pub struct CardSwipe {
    active: bool,
    offset: AnimatedValue,
}

impl CardSwipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn update(&mut self, dx: f64) {
        if !self.active && dx.abs() <= ACTIVATION_OFFSET {
            return;
        }
        self.active = true;
        self.offset.set(dx);
    }

    /// `can_hide` is false on screens without a hide action; the swipe then does nothing.
    pub fn release(&mut self, dx: f64, can_hide: bool, now: Instant) -> SwipeAction {
        let was_active = std::mem::take(&mut self.active);
        if !was_active && dx.abs() <= ACTIVATION_OFFSET {
            return SwipeAction::Tap;
        }
        self.offset.set(dx);
        self.offset.animate_to(0.0, Motion::Spring, now);
        if dx > ACTION_THRESHOLD {
            SwipeAction::OpenExternal
        } else if dx < -ACTION_THRESHOLD && can_hide {
            SwipeAction::Hide
        } else {
            SwipeAction::Cancelled
        }
    }

    pub fn offset(&self, now: Instant) -> f64 {
        self.offset.value_at(now)
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.offset.set(0.0);
    }
}
