//! Cancellable debounce timer.
//!
//! The host's tick loop drives the timer: [`schedule`](DebounceTimer::schedule)
//! on every input, [`fire_if_due`](DebounceTimer::fire_if_due) on every tick.
//! Scheduling again pushes the deadline out, so a burst of input fires once.

use std::time::Duration;
use web_time::Instant;

/// Single-shot timer with one active deadline.
#[derive(Debug, Clone)]
pub struct DebounceTimer {
    /// Wait this long after the last schedule before firing.
    delay: Duration,

    /// Deadline of the active schedule.
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)arm the timer relative to `now`, replacing any active deadline.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
        log::trace!("Debounce: scheduled in {:?}", self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm and return `true` if the deadline has passed.
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

    const DELAY: Duration = Duration::from_millis(50);

    #[test]
    fn test_fires_once_after_delay() {
        let start = Instant::now();
        let mut timer = DebounceTimer::new(DELAY);
        timer.schedule(start);

        assert!(!timer.fire_if_due(start + Duration::from_millis(49)));
        assert!(timer.fire_if_due(start + DELAY));
        assert!(!timer.fire_if_due(start + Duration::from_millis(200)));
        assert!(!timer.is_pending());
    }

    #[test]
    fn test_reschedule_pushes_deadline() {
        let start = Instant::now();
        let mut timer = DebounceTimer::new(DELAY);
        timer.schedule(start);
        timer.schedule(start + Duration::from_millis(40));

        assert!(!timer.fire_if_due(start + Duration::from_millis(60)));
        assert!(timer.fire_if_due(start + Duration::from_millis(90)));
    }

    #[test]
    fn test_cancel() {
        let start = Instant::now();
        let mut timer = DebounceTimer::new(DELAY);
        timer.schedule(start);
        timer.cancel();
        assert!(!timer.fire_if_due(start + Duration::from_secs(1)));
        assert!(!timer.is_pending());
    }
}
