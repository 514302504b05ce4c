use std::time::{Duration, Instant};

/// Angular frequency of the critically damped spring, in rad/s.
const SPRING_OMEGA: f64 = 12.0;
/// The spring is treated as settled (and snapped to its target) after this long.
const SPRING_SETTLE: Duration = Duration::from_millis(600);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    /// Quadratic ease-in-out over a fixed duration.
    Timing(Duration),
    Spring,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    from: f64,
    start: Instant,
    motion: Motion,
}

/// A scalar owned by one viewer. It only changes through `set`, `animate_to`
/// and `freeze`; everything else reads a snapshot at a given instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimatedValue {
    target: f64,
    segment: Option<Segment>,
}

impl Default for AnimatedValue {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl AnimatedValue {
    pub fn new(value: f64) -> Self {
        Self {
            target: value,
            segment: None,
        }
    }

    pub fn set(&mut self, value: f64) {
        self.target = value;
        self.segment = None;
    }

    pub fn animate_to(&mut self, target: f64, motion: Motion, now: Instant) {
        let from = self.value_at(now);
        self.target = target;
        if (from - target).abs() < f64::EPSILON {
            self.segment = None;
            return;
        }
        self.segment = Some(Segment {
            from,
            start: now,
            motion,
        });
    }

    /// Stops any motion where it currently is and returns that value.
    pub fn freeze(&mut self, now: Instant) -> f64 {
        let value = self.value_at(now);
        self.set(value);
        value
    }

    pub fn is_animating(&self, now: Instant) -> bool {
        match self.segment {
            Some(segment) => progress(&segment, now).is_some(),
            None => false,
        }
    }

    pub fn value_at(&self, now: Instant) -> f64 {
        let Some(segment) = self.segment else {
            return self.target;
        };
        match progress(&segment, now) {
            Some(eased) => segment.from + (self.target - segment.from) * eased,
            None => self.target,
        }
    }
}

/// Fraction of the way from `from` to the target, or `None` once finished.
fn progress(segment: &Segment, now: Instant) -> Option<f64> {
    let elapsed = now.saturating_duration_since(segment.start);
    match segment.motion {
        Motion::Timing(duration) => {
            if elapsed >= duration || duration.is_zero() {
                return None;
            }
            let t = elapsed.as_secs_f64() / duration.as_secs_f64();
            Some(ease_in_out_quad(t))
        }
        Motion::Spring => {
            if elapsed >= SPRING_SETTLE {
                return None;
            }
            let t = elapsed.as_secs_f64();
            let remaining = (1.0 + SPRING_OMEGA * t) * (-SPRING_OMEGA * t).exp();
            Some(1.0 - remaining)
        }
    }
}

fn ease_in_out_quad(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn timing_reaches_target_exactly() {
        let start = Instant::now();
        let mut value = AnimatedValue::new(0.0);
        value.animate_to(-400.0, Motion::Timing(ms(250)), start);
        assert_eq!(value.value_at(start), 0.0);
        let mid = value.value_at(start + ms(125));
        assert!((mid + 200.0).abs() < 1e-6, "midpoint was {mid}");
        assert_eq!(value.value_at(start + ms(250)), -400.0);
        assert!(!value.is_animating(start + ms(300)));
    }

    #[test]
    fn spring_moves_monotonically_and_settles() {
        let start = Instant::now();
        let mut value = AnimatedValue::new(80.0);
        value.animate_to(0.0, Motion::Spring, start);
        let mut last = 80.0;
        for step in 1..12 {
            let current = value.value_at(start + ms(step * 50));
            assert!(current <= last);
            assert!(current >= 0.0);
            last = current;
        }
        assert_eq!(value.value_at(start + SPRING_SETTLE), 0.0);
    }

    #[test]
    fn freeze_holds_current_value() {
        let start = Instant::now();
        let mut value = AnimatedValue::new(0.0);
        value.animate_to(100.0, Motion::Timing(ms(200)), start);
        let held = value.freeze(start + ms(100));
        assert!(held > 0.0 && held < 100.0);
        assert_eq!(value.value_at(start + ms(1000)), held);
        assert!(!value.is_animating(start + ms(100)));
    }

    #[test]
    fn retarget_starts_from_current_value() {
        let start = Instant::now();
        let mut value = AnimatedValue::new(0.0);
        value.animate_to(100.0, Motion::Timing(ms(100)), start);
        let at = value.value_at(start + ms(50));
        value.animate_to(0.0, Motion::Timing(ms(100)), start + ms(50));
        assert_eq!(value.value_at(start + ms(50)), at);
        assert_eq!(value.value_at(start + ms(150)), 0.0);
    }
}
