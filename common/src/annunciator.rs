//! Blinks fault codes on a single status pin without ever blocking the control loop.
//!
//! An announcement is a fixed preamble followed by the code, least significant bit first:
//!
//! ```text
//!  step:     0 1 2 3 4 5 6 7 | 8 sub-steps per bit ...
//!  preamble: _ _ _ # _ # _ _ | 0: ____#___   1: _######_
//! ```
//!
//! Each step lasts [`STEP_TICKS`]. Bits stop once no set bits remain, so `0x1` is one long
//! pulse after the preamble and `FaultCode::Ok` is the preamble alone.
//!
//! Concurrency contract: [`Annunciator::report`] is only called from the control loop (or
//! [`Annunciator::halt`]), [`Annunciator::step`] only from one periodic interrupt. The loop
//! side is the only one that moves Idle to Announcing and the interrupt side is the only
//! one that moves Announcing to Idle, so three word-sized atomics are enough and no lock is
//! taken. `step` does counter arithmetic only.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use crate::Tick;
use crate::diag::{DiagMsg, Echo};
use crate::fault::FaultCode;
use crate::peripherals::Clock;

pub const STEP_TICKS: Tick = 64;

const PREAMBLE: u8 = 0b0010_1000;
const PREAMBLE_STEPS: Tick = 8;
const STEPS_PER_BIT: Tick = 8;
const ONE_MASK: u8 = 0b0111_1110;
const ZERO_MASK: u8 = 0b0001_0000;

/// Pin level `elapsed` ticks into the announcement of `code`, `None` once it is over.
pub fn pattern_level(code: u8, elapsed: Tick) -> Option<bool> {
    let step = elapsed / STEP_TICKS;
    if step < PREAMBLE_STEPS {
        return Some((PREAMBLE >> step) & 1 == 1);
    }

    let step = step - PREAMBLE_STEPS;
    let bit = step / STEPS_PER_BIT;
    if bit >= u8::BITS {
        return None;
    }
    let remaining = code >> bit;
    if remaining == 0 {
        return None;
    }

    let mask = if remaining & 1 == 1 { ONE_MASK } else { ZERO_MASK };
    Some((mask >> (step % STEPS_PER_BIT)) & 1 == 1)
}

/// Ticks needed to play `code` in full.
pub fn pattern_len(code: u8) -> Tick {
    let bits = u8::BITS - code.leading_zeros();
    (PREAMBLE_STEPS + bits * STEPS_PER_BIT) * STEP_TICKS
}

pub struct Annunciator {
    active: AtomicBool,
    code: AtomicU8,
    start: AtomicU32,
}

impl Default for Annunciator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annunciator {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            code: AtomicU8::new(0),
            start: AtomicU32::new(0),
        }
    }

    /// Start announcing `code` unless another announcement is still playing.
    ///
    /// Returns whether the code was accepted. A rejected code is dropped, not queued.
    pub fn report(&self, code: FaultCode, now: Tick) -> bool {
        if self.active.load(Ordering::Acquire) {
            return false;
        }
        self.code.store(code.code(), Ordering::Relaxed);
        self.start.store(now, Ordering::Relaxed);
        self.active.store(true, Ordering::Release);
        true
    }

    pub fn is_idle(&self) -> bool {
        !self.active.load(Ordering::Acquire)
    }

    /// Code currently being played, if any.
    pub fn current(&self) -> Option<FaultCode> {
        if self.is_idle() {
            return None;
        }
        FaultCode::try_from(self.code.load(Ordering::Relaxed)).ok()
    }

    /// Advance the schedule. Run from the periodic interrupt.
    ///
    /// Returns the level to drive the pin to, or `None` while idle (pin stays low).
    pub fn step(&self, now: Tick) -> Option<bool> {
        if !self.active.load(Ordering::Acquire) {
            return None;
        }
        let code = self.code.load(Ordering::Relaxed);
        let start = self.start.load(Ordering::Relaxed);

        let level = pattern_level(code, now.wrapping_sub(start));
        if level.is_none() {
            self.active.store(false, Ordering::Release);
        }
        level
    }

    /// Announce `code` forever. For bring-up failures before the control loop runs.
    ///
    /// Relies on the interrupt driving [`Annunciator::step`] being already enabled.
    pub fn halt<C: Clock, E: Echo>(&self, code: FaultCode, clock: &C, echo: &mut E) -> ! {
        error!("halt: {}", code);
        echo.echo(&DiagMsg::Panic(code.code()));

        loop {
            self.report(code, clock.now());
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    /// Sample every step in its middle, driving `step` like the interrupt would.
    fn play(annunciator: &Annunciator, start: Tick, steps: u32) -> Vec<Option<bool>> {
        (0..steps)
            .map(|i| annunciator.step(start.wrapping_add(i * STEP_TICKS + STEP_TICKS / 2)))
            .collect()
    }

    fn expected(code: u8) -> Vec<Option<bool>> {
        (0..pattern_len(code) / STEP_TICKS)
            .map(|i| pattern_level(code, i * STEP_TICKS + STEP_TICKS / 2))
            .collect()
    }

    fn lit(levels: &[Option<bool>]) -> usize {
        levels.iter().filter(|l| **l == Some(true)).count()
    }

    #[test]
    fn ok_code_is_the_preamble_alone() {
        let levels: Vec<_> = (0..8).map(|s| pattern_level(0, s * STEP_TICKS)).collect();
        assert_eq!(
            levels,
            [false, false, false, true, false, true, false, false].map(Some)
        );
        assert_eq!(pattern_level(0, 8 * STEP_TICKS), None);
        assert_eq!(pattern_len(0), 8 * STEP_TICKS);
    }

    #[test]
    fn one_is_a_long_pulse() {
        let bit: Vec<_> = (8..16).map(|s| pattern_level(1, s * STEP_TICKS)).collect();
        assert_eq!(
            bit,
            [false, true, true, true, true, true, true, false].map(Some)
        );
        assert_eq!(pattern_level(1, 16 * STEP_TICKS), None);
    }

    #[test]
    fn zero_bits_are_short_pulses() {
        // 0xA = 0b1010: short, long, short, long
        let levels = expected(0xA);
        assert_eq!(levels.len(), 8 + 4 * 8);
        assert_eq!(lit(&levels), 2 + 1 + 6 + 1 + 6);
        assert_eq!(levels[8 + 4], Some(true));
        assert_eq!(levels[8 + 1], Some(false));
        assert_eq!(pattern_level(0xA, pattern_len(0xA)), None);
    }

    #[test]
    fn highest_code_uses_all_bits() {
        assert_eq!(pattern_len(0x80), (8 + 8 * 8) * STEP_TICKS);
        assert_eq!(pattern_level(0x80, (8 + 7 * 8 + 1) * STEP_TICKS), Some(true));
        assert_eq!(pattern_level(0xff, (8 + 8 * 8) * STEP_TICKS), None);
    }

    #[test]
    fn idle_step_does_nothing() {
        let annunciator = Annunciator::new();
        assert_eq!(annunciator.step(1234), None);
        assert!(annunciator.is_idle());
        assert_eq!(annunciator.current(), None);
    }

    #[test]
    fn second_report_is_dropped_while_playing() {
        let annunciator = Annunciator::new();
        let start = 1_000;

        assert!(annunciator.report(FaultCode::IntegrityFailure, start));
        assert!(!annunciator.report(FaultCode::SafetyTimeout, start + 10));
        assert_eq!(annunciator.current(), Some(FaultCode::IntegrityFailure));

        let code = FaultCode::IntegrityFailure.code();
        let steps = pattern_len(code) / STEP_TICKS;
        let mut played = play(&annunciator, start, steps / 2);
        assert!(!annunciator.report(FaultCode::SafetyTimeout, start + 600));
        played.extend(
            (steps / 2..steps)
                .map(|i| annunciator.step(start + i * STEP_TICKS + STEP_TICKS / 2)),
        );

        assert_eq!(played, expected(code));
        assert!(!annunciator.is_idle());
        assert_eq!(annunciator.step(start + pattern_len(code)), None);
        assert!(annunciator.is_idle());

        assert!(annunciator.report(FaultCode::SafetyTimeout, start + 5_000));
        assert_eq!(annunciator.current(), Some(FaultCode::SafetyTimeout));
    }

    #[test]
    fn schedule_survives_tick_wraparound() {
        let annunciator = Annunciator::new();
        let start = u32::MAX - 100;
        assert!(annunciator.report(FaultCode::Send, start));

        let played = play(&annunciator, start, pattern_len(7) / STEP_TICKS);
        assert_eq!(played, expected(7));
        assert_eq!(annunciator.step(start.wrapping_add(pattern_len(7))), None);
        assert!(annunciator.is_idle());
    }

    #[test]
    fn interrupt_and_loop_can_share_it() {
        use std::sync::Arc;
        use std::thread;

        let annunciator = Arc::new(Annunciator::new());
        let ticker = {
            let annunciator = Arc::clone(&annunciator);
            thread::spawn(move || {
                for now in 0..200_000u32 {
                    annunciator.step(now);
                }
            })
        };
        for now in 0..200_000u32 {
            annunciator.report(FaultCode::UnknownCommand, now);
        }
        ticker.join().unwrap();

        assert!(
            annunciator.is_idle() || annunciator.current() == Some(FaultCode::UnknownCommand)
        );
    }
}
