//! [`Throttle`] – elapsed-time rate limiter for status publication.
//!
//! The first call to [`Throttle::ready`] always fires; after that it fires
//! again once at least `period` has passed since the last time it fired.
//! Being time-based, the publication cadence does not change when the
//! control loop rate does.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Throttle {
    period: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// Build from a period in seconds.  Negative or non-finite values are
    /// treated as zero (no throttling).
    pub fn from_secs_f64(period: f64) -> Self {
        let period = if period.is_finite() && period > 0.0 {
            Duration::from_secs_f64(period)
        } else {
            Duration::ZERO
        };
        Self::new(period)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }

    /// `true` if the period has elapsed; resets the timer when it has.
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    /// [`ready`](Self::ready) against an explicit clock reading.
    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forget the last firing so the next call fires immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_fires() {
        let mut t = Throttle::new(Duration::from_secs(10));
        assert!(t.ready());
        assert!(!t.ready());
    }

    #[test]
    fn fires_once_per_period() {
        let start = Instant::now();
        let mut t = Throttle::new(Duration::from_millis(100));
        // 1 kHz loop for one second.
        let fired = (0..1000)
            .filter(|i| t.ready_at(start + Duration::from_millis(*i)))
            .count();
        assert_eq!(fired, 10);
    }

    #[test]
    fn zero_period_always_fires() {
        let mut t = Throttle::new(Duration::ZERO);
        assert!(t.ready());
        assert!(t.ready());
    }

    #[test]
    fn from_secs_handles_bad_values() {
        assert_eq!(Throttle::from_secs_f64(0.1).period(), Duration::from_millis(100));
        assert_eq!(Throttle::from_secs_f64(-1.0).period(), Duration::ZERO);
        assert_eq!(Throttle::from_secs_f64(f64::NAN).period(), Duration::ZERO);
    }

    #[test]
    fn reset_fires_immediately() {
        let mut t = Throttle::new(Duration::from_secs(60));
        assert!(t.ready());
        t.reset();
        assert!(t.ready());
    }

    #[test]
    fn clock_going_backwards_does_not_fire() {
        let start = Instant::now() + Duration::from_secs(1);
        let mut t = Throttle::new(Duration::from_millis(10));
        assert!(t.ready_at(start));
        assert!(!t.ready_at(start - Duration::from_millis(500)));
    }
}
