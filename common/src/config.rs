//! Build-time settings for both ends of the link.
//!
//! Defaults are the values the vehicle was tuned with. Everything here is fixed when the
//! firmware is built; nothing is negotiated or changed at runtime.

use core::f32::consts::PI;

use crate::Tick;
use crate::messages::StatusSchema;

/// Servo/ESC pulse widths in microseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseRange {
    pub min_us: u16,
    /// Output while no fresh command is held. Slightly below centre so the ESC brakes.
    pub neutral_us: u16,
    pub max_us: u16,
}

impl Default for PulseRange {
    fn default() -> Self {
        Self {
            min_us: 1000,
            neutral_us: 1400,
            max_us: 2000,
        }
    }
}

impl PulseRange {
    /// Linear map of the full `i8` range onto `min_us..=max_us`.
    ///
    /// Integer interpolation truncating toward zero, clamped to the range:
    /// `min + (value + 128) * (max - min) / 255`.
    pub fn map(&self, value: i8) -> u16 {
        let lo = self.min_us.min(self.max_us) as i32;
        let hi = self.min_us.max(self.max_us) as i32;
        let span = self.max_us as i32 - self.min_us as i32;
        let offset = value as i32 - i8::MIN as i32;

        let us = self.min_us as i32 + offset * span / (i8::MAX as i32 - i8::MIN as i32);
        us.clamp(lo, hi) as u16
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Drivetrain {
    pub wheel_circumference_m: f32,
    /// Wheel turns per motor turn
    pub gear_ratio: f32,
    /// Divides electrical rpm down to motor rpm
    pub motor_poles: u8,
}

impl Default for Drivetrain {
    fn default() -> Self {
        Self {
            wheel_circumference_m: 0.075 * PI,
            gear_ratio: 16.0 / 48.0,
            motor_poles: 7,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PaLevel {
    Min,
    Low,
    #[default]
    High,
    Max,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataRate {
    #[default]
    Kbps250,
    Mbps1,
    Mbps2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioConfig {
    pub channel: u8,
    pub power: PaLevel,
    pub data_rate: DataRate,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            channel: 76,
            power: PaLevel::High,
            data_rate: DataRate::Kbps250,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VehicleConfig {
    /// Ticks without a valid command before the output drops to neutral.
    pub failsafe_timeout: Tick,
    pub status_period: Tick,
    pub telemetry_period: Tick,
    pub pulse: PulseRange,
    pub drivetrain: Drivetrain,
    pub schema: StatusSchema,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            failsafe_timeout: 500,
            status_period: 100,
            telemetry_period: 100,
            pulse: PulseRange::default(),
            drivetrain: Drivetrain::default(),
            schema: StatusSchema::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandsetConfig {
    pub command_period: Tick,
    /// Telemetry older than this is treated as absent.
    pub status_expiry: Tick,
    pub schema: StatusSchema,
}

impl Default for HandsetConfig {
    fn default() -> Self {
        Self {
            command_period: 10,
            status_expiry: 2000,
            schema: StatusSchema::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_map_end_points() {
        let range = PulseRange::default();
        assert_eq!(range.map(i8::MIN), 1000);
        assert_eq!(range.map(i8::MAX), 2000);
        assert_eq!(range.map(0), 1501);
        assert_eq!(range.map(64), 1752);
        assert_eq!(range.map(-64), 1250);
    }

    #[test]
    fn pulse_map_is_monotonic() {
        let range = PulseRange::default();
        let mut last = 0;
        for value in i8::MIN..=i8::MAX {
            let us = range.map(value);
            assert!(us >= last);
            assert!((1000..=2000).contains(&us));
            last = us;
        }
    }

    #[test]
    fn inverted_range_stays_clamped() {
        let range = PulseRange {
            min_us: 2000,
            neutral_us: 1500,
            max_us: 1000,
        };
        assert_eq!(range.map(i8::MIN), 2000);
        assert_eq!(range.map(i8::MAX), 1000);
        assert_eq!(range.map(64), 1248);
    }
}
