//! Conversion between ESC-native telemetry and the wire `Status`.
//!
//! The counterpart endpoint divides by the same factors, so these must not drift:
//! currents and voltage go out in tenths, duty cycle as a fraction of 255, speed in tenths
//! of km/h and temperature in whole degrees. Float to integer casts truncate toward zero
//! and saturate at the field limits.

use crate::config::Drivetrain;
use crate::messages::{Status, StatusExt, StatusSchema};

/// One reading from the ESC, in the units the ESC reports.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetrySample {
    pub temp_mosfet: f32,
    pub avg_motor_current: f32,
    pub avg_input_current: f32,
    /// -1.0..=1.0
    pub duty_cycle_now: f32,
    /// Electrical rpm
    pub rpm: f32,
    pub inp_voltage: f32,
    pub tachometer: i32,
    pub tachometer_abs: i32,
}

impl TelemetrySample {
    /// Ground speed in km/h for the given drivetrain.
    pub fn speed_kmh(&self, drivetrain: &Drivetrain) -> f32 {
        let wheel_rpm = self.rpm / drivetrain.motor_poles as f32 * drivetrain.gear_ratio;
        drivetrain.wheel_circumference_m * wheel_rpm * 0.06
    }
}

impl Status {
    pub fn from_sample(sample: &TelemetrySample, drivetrain: &Drivetrain, schema: StatusSchema) -> Self {
        let extended = match schema {
            StatusSchema::Narrow => None,
            StatusSchema::Extended => Some(StatusExt {
                rpm: sample.rpm as i32,
                tachometer: sample.tachometer,
                tachometer_abs: sample.tachometer_abs,
            }),
        };

        Status {
            temp_fet: sample.temp_mosfet as i8,
            amps_motor: (sample.avg_motor_current * 10.0) as i16,
            amps_input: (sample.avg_input_current * 10.0) as i16,
            duty_cycle: (sample.duty_cycle_now * u8::MAX as f32) as u8,
            speed: (sample.speed_kmh(drivetrain) * 10.0) as u8,
            volt_input: (sample.inp_voltage * 10.0) as i16,
            extended,
        }
    }

    pub fn motor_current_a(&self) -> f32 {
        self.amps_motor as f32 / 10.0
    }

    pub fn input_current_a(&self) -> f32 {
        self.amps_input as f32 / 10.0
    }

    pub fn input_voltage_v(&self) -> f32 {
        self.volt_input as f32 / 10.0
    }

    pub fn speed_kmh(&self) -> f32 {
        self.speed as f32 / 10.0
    }

    pub fn duty_fraction(&self) -> f32 {
        self.duty_cycle as f32 / u8::MAX as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetrySample {
        TelemetrySample {
            temp_mosfet: 41.9,
            avg_motor_current: 12.37,
            avg_input_current: -3.05,
            duty_cycle_now: 0.5,
            rpm: 21_000.0,
            inp_voltage: 24.66,
            tachometer: 5_000,
            tachometer_abs: 7_000,
        }
    }

    #[test]
    fn narrow_scaling_truncates() {
        let status = Status::from_sample(&sample(), &Drivetrain::default(), StatusSchema::Narrow);
        assert_eq!(status.temp_fet, 41);
        assert_eq!(status.amps_motor, 123);
        assert_eq!(status.amps_input, -30);
        assert_eq!(status.duty_cycle, 127);
        assert_eq!(status.volt_input, 246);
        assert_eq!(status.extended, None);
    }

    #[test]
    fn speed_follows_the_drivetrain() {
        // 21000 erpm / 7 poles * 16/48 = 1000 wheel rpm on a 75mm wheel
        let drivetrain = Drivetrain::default();
        let kmh = sample().speed_kmh(&drivetrain);
        assert!((kmh - 14.137).abs() < 0.01, "{kmh}");

        let status = Status::from_sample(&sample(), &drivetrain, StatusSchema::Narrow);
        assert_eq!(status.speed, 141);
        assert!((status.speed_kmh() - 14.1).abs() < 1e-4);
    }

    #[test]
    fn extended_schema_carries_counters() {
        let status = Status::from_sample(&sample(), &Drivetrain::default(), StatusSchema::Extended);
        let ext = status.extended.unwrap();
        assert_eq!(ext.rpm, 21_000);
        assert_eq!(ext.tachometer, 5_000);
        assert_eq!(ext.tachometer_abs, 7_000);
    }

    #[test]
    fn out_of_range_values_saturate() {
        let wild = TelemetrySample {
            temp_mosfet: 300.0,
            duty_cycle_now: -0.4,
            inp_voltage: 10_000.0,
            rpm: 1.0e9,
            ..sample()
        };
        let status = Status::from_sample(&wild, &Drivetrain::default(), StatusSchema::Narrow);
        assert_eq!(status.temp_fet, i8::MAX);
        assert_eq!(status.duty_cycle, 0);
        assert_eq!(status.volt_input, i16::MAX);
        assert_eq!(status.speed, u8::MAX);
    }

    #[test]
    fn display_accessors_undo_the_scale() {
        let status = Status {
            amps_motor: 153,
            amps_input: -40,
            volt_input: 252,
            duty_cycle: 255,
            ..Status::default()
        };
        assert!((status.motor_current_a() - 15.3).abs() < 1e-4);
        assert!((status.input_current_a() + 4.0).abs() < 1e-4);
        assert!((status.input_voltage_v() - 25.2).abs() < 1e-4);
        assert_eq!(status.duty_fraction(), 1.0);
    }
}
