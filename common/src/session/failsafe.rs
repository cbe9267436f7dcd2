use crate::Tick;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailsafeCheck {
    /// A command arrived within the timeout.
    Fresh,
    /// The timeout just lapsed. Reported once.
    Tripped,
    /// Still timed out since an earlier `Tripped`.
    Holding,
}

/// Tracks how old the last accepted throttle command is.
#[derive(Clone, Copy, Debug)]
pub struct Failsafe {
    timeout: Tick,
    last_valid: Tick,
    tripped: bool,
}

impl Failsafe {
    /// Starts as if a command arrived at tick 0, so a vehicle that never hears the
    /// handset still trips after `timeout`.
    pub const fn new(timeout: Tick) -> Self {
        Self {
            timeout,
            last_valid: 0,
            tripped: false,
        }
    }

    pub fn command_accepted(&mut self, now: Tick) {
        self.last_valid = now;
        self.tripped = false;
    }

    pub fn check(&mut self, now: Tick) -> FailsafeCheck {
        if now.wrapping_sub(self.last_valid) <= self.timeout {
            return FailsafeCheck::Fresh;
        }
        if self.tripped {
            return FailsafeCheck::Holding;
        }
        self.tripped = true;
        FailsafeCheck::Tripped
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    pub fn last_valid(&self) -> Tick {
        self.last_valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_once_after_the_timeout() {
        let mut failsafe = Failsafe::new(500);
        assert_eq!(failsafe.check(500), FailsafeCheck::Fresh);
        assert_eq!(failsafe.check(501), FailsafeCheck::Tripped);
        assert!(failsafe.is_tripped());
        for now in 502..2_000 {
            assert_eq!(failsafe.check(now), FailsafeCheck::Holding);
        }
    }

    #[test]
    fn new_command_rearms() {
        let mut failsafe = Failsafe::new(500);
        assert_eq!(failsafe.check(700), FailsafeCheck::Tripped);

        failsafe.command_accepted(710);
        assert!(!failsafe.is_tripped());
        assert_eq!(failsafe.last_valid(), 710);
        assert_eq!(failsafe.check(1_210), FailsafeCheck::Fresh);
        assert_eq!(failsafe.check(1_211), FailsafeCheck::Tripped);
    }

    #[test]
    fn commands_keep_it_fresh() {
        let mut failsafe = Failsafe::new(500);
        for now in (0..10_000).step_by(10) {
            failsafe.command_accepted(now);
            assert_eq!(failsafe.check(now + 5), FailsafeCheck::Fresh);
        }
    }
}
