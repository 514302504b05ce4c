use std::time::{Duration, Instant};

/// A single pending action with a deadline. Scheduling always replaces the
/// previous deadline, so at most one action is ever outstanding.
#[derive(Debug, Default, Clone)]
pub struct Deferred {
    deadline: Option<Instant>,
}

impl Deferred {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels whatever was pending and arms a new deadline.
    pub fn schedule(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Disarms and returns true once the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_deadline() {
        let start = Instant::now();
        let mut timer = Deferred::new();
        timer.schedule(start, Duration::from_secs(2));
        assert!(!timer.fire_if_due(start + Duration::from_millis(1999)));
        assert!(timer.fire_if_due(start + Duration::from_secs(2)));
        assert!(!timer.fire_if_due(start + Duration::from_secs(3)));
    }

    #[test]
    fn reschedule_replaces_previous_deadline() {
        let start = Instant::now();
        let mut timer = Deferred::new();
        timer.schedule(start, Duration::from_secs(2));
        timer.schedule(start + Duration::from_secs(1), Duration::from_secs(2));
        assert!(!timer.fire_if_due(start + Duration::from_millis(2500)));
        assert!(timer.fire_if_due(start + Duration::from_secs(3)));
    }

    #[test]
    fn cancel_disarms() {
        let start = Instant::now();
        let mut timer = Deferred::new();
        timer.schedule(start, Duration::ZERO);
        timer.cancel();
        assert!(!timer.fire_if_due(start + Duration::from_secs(10)));
    }
}
