//! Tick scheduling
//!
//! The detection loop never sleeps or spins on its own. After every tick it
//! asks its [`Scheduler`] for another one, and whoever owns the scheduler
//! decides when to call `tick` again. The UI drives ticks from its event loop
//! with a [`FrameTimer`]; tests drive them synchronously with a
//! `ManualScheduler`.

use std::time::{Duration, Instant};

/// Requests the next tick of the detection loop
pub trait Scheduler {
    /// Ask for one tick after `delay`. Replaces any pending request.
    fn schedule_after(&mut self, delay: Duration);

    /// Drop the pending request, if any
    fn cancel(&mut self);
}

/// Deadline-based scheduler polled by an event loop
#[derive(Debug, Default)]
pub struct FrameTimer {
    next_tick: Option<Instant>,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the next tick is due, if one is pending
    pub fn deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Consume the pending request if its deadline has passed
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.next_tick {
            Some(deadline) if now >= deadline => {
                self.next_tick = None;
                true
            }
            _ => false,
        }
    }
}

impl Scheduler for FrameTimer {
    fn schedule_after(&mut self, delay: Duration) {
        self.next_tick = Some(Instant::now() + delay);
    }

    fn cancel(&mut self) {
        self.next_tick = None;
    }
}

/// Scheduler that only records requests; the caller runs ticks itself
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualScheduler {
    pending: Option<Duration>,
    requested: usize,
}

#[cfg(test)]
impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay of the pending request
    pub fn pending(&self) -> Option<Duration> {
        self.pending
    }

    /// Consume the pending request, returning whether there was one
    pub fn take_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Total number of requests received
    pub fn requested(&self) -> usize {
        self.requested
    }
}

#[cfg(test)]
impl Scheduler for ManualScheduler {
    fn schedule_after(&mut self, delay: Duration) {
        self.pending = Some(delay);
        self.requested += 1;
    }

    fn cancel(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timer_due() {
        let mut timer = FrameTimer::new();
        assert!(!timer.take_due(Instant::now()));

        timer.schedule_after(Duration::ZERO);
        assert!(timer.deadline().is_some());
        assert!(timer.take_due(Instant::now()));
        assert!(!timer.take_due(Instant::now()));
    }

    #[test]
    fn test_frame_timer_not_yet_due() {
        let mut timer = FrameTimer::new();
        timer.schedule_after(Duration::from_secs(60));
        assert!(!timer.take_due(Instant::now()));
        assert!(timer.deadline().is_some());
    }

    #[test]
    fn test_frame_timer_cancel() {
        let mut timer = FrameTimer::new();
        timer.schedule_after(Duration::ZERO);
        timer.cancel();
        assert!(timer.deadline().is_none());
        assert!(!timer.take_due(Instant::now()));
    }

    #[test]
    fn test_manual_scheduler_replaces_pending() {
        let mut scheduler = ManualScheduler::new();
        scheduler.schedule_after(Duration::from_millis(5));
        scheduler.schedule_after(Duration::from_millis(10));
        assert_eq!(scheduler.pending(), Some(Duration::from_millis(10)));
        assert_eq!(scheduler.requested(), 2);
        assert!(scheduler.take_pending());
        assert!(!scheduler.take_pending());
    }
}
