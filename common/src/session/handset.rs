use super::{FaultReporter, Link, RateLimiter};
use crate::Tick;
use crate::codec::CipherKey;
use crate::config::HandsetConfig;
use crate::diag::{DiagMsg, Echo};
use crate::fault::FaultCode;
use crate::messages::{Message, Status};
use crate::peripherals::{Radio, ThrottleInput};

/// Stick position to throttle value.
///
/// `reference` is the ADC reading of the pot supply; the top 10 counts are dead band so a
/// slightly sagging supply still reaches full throttle. A reference too low to scale
/// against yields 0.
pub fn throttle_from_adc(position: u16, reference: u16) -> i8 {
    let full_scale = reference as i32 - 10;
    if full_scale <= 0 {
        return 0;
    }
    let span = i8::MAX as i32 - i8::MIN as i32;
    let value = position as i32 * span / full_scale + i8::MIN as i32;
    value.clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

/// Handset battery in hundredths of a volt, from the pot supply sample in 10-bit counts.
///
/// Two-point calibration of the supply divider: 445 counts read 4.19 V, 635 read 4.46 V.
/// Truncating linear interpolation, not clamped to the calibration points.
pub fn battery_centivolts_from_adc(supply: u16) -> u16 {
    const LOW: (i32, i32) = (445, 419);
    const HIGH: (i32, i32) = (635, 446);
    let cv = LOW.1 + (supply as i32 - LOW.0) * (HIGH.1 - LOW.1) / (HIGH.0 - LOW.0);
    cv.clamp(0, u16::MAX as i32) as u16
}

/// Transmitter end: streams the stick position and keeps the latest telemetry.
pub struct Handset<'a, R, T, E> {
    link: Link<R>,
    throttle: T,
    reporter: FaultReporter<'a, E>,
    config: HandsetConfig,
    command_rate: RateLimiter,
    status: Option<(Status, Tick)>,
    last_command: Option<i8>,
}

impl<'a, R, T, E> Handset<'a, R, T, E>
where
    R: Radio,
    T: ThrottleInput,
    E: Echo,
{
    /// The link speaks the status schema named in `config`.
    pub fn new(
        radio: R,
        key: CipherKey,
        throttle: T,
        reporter: FaultReporter<'a, E>,
        config: HandsetConfig,
    ) -> Self {
        Self {
            link: Link::new(radio, key, config.schema),
            throttle,
            reporter,
            command_rate: RateLimiter::new(config.command_period),
            config,
            status: None,
            last_command: None,
        }
    }

    pub fn start(&mut self, now: Tick) {
        self.reporter.echo(&DiagMsg::Boot);
        self.reporter.report(FaultCode::Ok, now);
    }

    pub fn tick(&mut self, now: Tick) {
        self.send_command(now);
        self.receive(now);
    }

    fn send_command(&mut self, now: Tick) {
        if !self.command_rate.fire(now) {
            return;
        }
        let value = self.throttle.read();
        self.last_command = Some(value);
        if let Err(e) = self.link.send(&Message::SetPwm { value }) {
            self.reporter.report(e.fault_code(), now);
        }
    }

    fn receive(&mut self, now: Tick) {
        match self.link.poll() {
            Ok(None) => {}
            Ok(Some(Message::ReplyStatus(status))) => {
                self.status = Some((status, now));
                self.reporter.echo(&DiagMsg::Status(status));
            }
            Ok(Some(Message::SetPwm { .. })) => {
                debug!("throttle frame sent to the handset, ignored");
                self.reporter.report(FaultCode::UnknownCommand, now);
            }
            Err(e) => {
                debug!("dropped frame: {}", e.fault_code());
                self.reporter.report(e.fault_code(), now);
            }
        }
    }

    /// Latest telemetry unless it is older than the configured expiry.
    pub fn status(&self, now: Tick) -> Option<&Status> {
        match &self.status {
            Some((status, at)) if now.wrapping_sub(*at) < self.config.status_expiry => Some(status),
            _ => None,
        }
    }

    /// Fault to show next to the telemetry, same expiry as the telemetry.
    pub fn recent_fault(&self, now: Tick) -> Option<FaultCode> {
        self.reporter.recent(now, self.config.status_expiry)
    }

    /// Handset battery, if the throttle input measures its supply.
    pub fn battery_centivolts(&self) -> Option<u16> {
        self.throttle.supply().map(battery_centivolts_from_adc)
    }

    pub fn last_command(&self) -> Option<i8> {
        self.last_command
    }

    pub fn link(&self) -> &Link<R> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut Link<R> {
        &mut self.link
    }

    pub fn throttle_mut(&mut self) -> &mut T {
        &mut self.throttle
    }

    pub fn reporter(&self) -> &FaultReporter<'a, E> {
        &self.reporter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_spans_the_pot() {
        // 1.1V internal reference, pot supply reads ~600 counts
        assert_eq!(throttle_from_adc(0, 600), -128);
        assert_eq!(throttle_from_adc(590, 600), 127);
        assert_eq!(throttle_from_adc(297, 600), 0);
        assert_eq!(throttle_from_adc(295, 600), -1);
        assert_eq!(throttle_from_adc(1023, 600), 127);
    }

    #[test]
    fn battery_calibration_points() {
        assert_eq!(battery_centivolts_from_adc(445), 419);
        assert_eq!(battery_centivolts_from_adc(635), 446);
        // 95 * 27 / 190 = 13.5
        assert_eq!(battery_centivolts_from_adc(540), 432);
        // Outside the calibration the line keeps going
        assert_eq!(battery_centivolts_from_adc(0), 356);
        assert_eq!(battery_centivolts_from_adc(1023), 501);
    }

    #[test]
    fn degenerate_reference_is_neutral() {
        assert_eq!(throttle_from_adc(300, 10), 0);
        assert_eq!(throttle_from_adc(300, 0), 0);
    }
}
