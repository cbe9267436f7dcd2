use crate::Tick;

/// Lets an action through at most once per `period` ticks.
#[derive(Clone, Copy, Debug)]
pub struct RateLimiter {
    period: Tick,
    last: Tick,
}

impl RateLimiter {
    pub const fn new(period: Tick) -> Self {
        Self { period, last: 0 }
    }

    /// True if at least `period` ticks passed since the last time this returned true.
    /// Only a `true` result moves the reference point.
    pub fn fire(&mut self, now: Tick) -> bool {
        if now.wrapping_sub(self.last) < self.period {
            return false;
        }
        self.last = now;
        true
    }

    pub fn last_fired(&self) -> Tick {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_period() {
        let mut rate = RateLimiter::new(100);
        assert!(!rate.fire(50));
        assert_eq!(rate.last_fired(), 0);

        assert!(rate.fire(100));
        assert_eq!(rate.last_fired(), 100);

        assert!(!rate.fire(150));
        assert!(!rate.fire(199));
        assert_eq!(rate.last_fired(), 100);

        assert!(rate.fire(230));
        assert_eq!(rate.last_fired(), 230);
        assert!(!rate.fire(329));
        assert!(rate.fire(330));
    }

    #[test]
    fn late_calls_do_not_catch_up() {
        let mut rate = RateLimiter::new(10);
        assert!(rate.fire(1_000));
        assert!(!rate.fire(1_005));
        assert!(rate.fire(1_010));
    }

    #[test]
    fn zero_period_always_fires() {
        let mut rate = RateLimiter::new(0);
        assert!(rate.fire(0));
        assert!(rate.fire(0));
        assert!(rate.fire(1));
    }

    #[test]
    fn handles_clock_wraparound() {
        let mut rate = RateLimiter::new(100);
        assert!(rate.fire(u32::MAX - 20));
        assert!(!rate.fire(50));
        assert!(rate.fire(79));
    }
}
