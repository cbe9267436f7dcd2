use super::{Failsafe, FailsafeCheck, FaultReporter, Link, RateLimiter};
use crate::Tick;
use crate::codec::CipherKey;
use crate::config::VehicleConfig;
use crate::diag::{DiagMsg, Echo};
use crate::fault::FaultCode;
use crate::messages::{Message, Status};
use crate::peripherals::{Actuator, Radio, TelemetrySource};

/// Receiver end: drives the ESC from throttle commands and sends telemetry back.
pub struct Vehicle<'a, R, A, T, E> {
    link: Link<R>,
    actuator: A,
    telemetry: T,
    reporter: FaultReporter<'a, E>,
    config: VehicleConfig,
    failsafe: Failsafe,
    telemetry_rate: RateLimiter,
    status_rate: RateLimiter,
    snapshot: Option<Status>,
    fresh: bool,
    pulse_us: u16,
}

impl<'a, R, A, T, E> Vehicle<'a, R, A, T, E>
where
    R: Radio,
    A: Actuator,
    T: TelemetrySource,
    E: Echo,
{
    /// The link speaks the status schema named in `config`.
    pub fn new(
        radio: R,
        key: CipherKey,
        actuator: A,
        telemetry: T,
        reporter: FaultReporter<'a, E>,
        config: VehicleConfig,
    ) -> Self {
        Self {
            link: Link::new(radio, key, config.schema),
            actuator,
            telemetry,
            reporter,
            failsafe: Failsafe::new(config.failsafe_timeout),
            telemetry_rate: RateLimiter::new(config.telemetry_period),
            status_rate: RateLimiter::new(config.status_period),
            snapshot: None,
            fresh: false,
            pulse_us: config.pulse.neutral_us,
            config,
        }
    }

    /// Park the output at neutral and flash the boot pattern. Call once before the loop.
    pub fn start(&mut self, now: Tick) {
        self.write_pulse(self.config.pulse.neutral_us);
        self.reporter.echo(&DiagMsg::Boot);
        self.reporter.report(FaultCode::Ok, now);
    }

    pub fn tick(&mut self, now: Tick) {
        self.check_failsafe(now);
        self.receive(now);
        self.gather_telemetry(now);
        self.send_status(now);
    }

    fn check_failsafe(&mut self, now: Tick) {
        match self.failsafe.check(now) {
            FailsafeCheck::Fresh => {}
            FailsafeCheck::Tripped => {
                let silent = now.wrapping_sub(self.failsafe.last_valid());
                warn!("no command for {} ticks, output to neutral", silent);
                self.write_pulse(self.config.pulse.neutral_us);
                self.reporter.report(FaultCode::SafetyTimeout, now);
            }
            FailsafeCheck::Holding => self.write_pulse(self.config.pulse.neutral_us),
        }
    }

    fn receive(&mut self, now: Tick) {
        match self.link.poll() {
            Ok(None) => {}
            Ok(Some(Message::SetPwm { value })) => {
                self.failsafe.command_accepted(now);
                let us = self.config.pulse.map(value);
                trace!("throttle {} -> {}us", value, us);
                self.write_pulse(us);
            }
            Ok(Some(Message::ReplyStatus(_))) => {
                debug!("status frame sent to the vehicle, ignored");
                self.reporter.report(FaultCode::UnknownCommand, now);
            }
            Err(e) => {
                debug!("dropped frame: {}", e.fault_code());
                self.reporter.report(e.fault_code(), now);
            }
        }
    }

    fn gather_telemetry(&mut self, now: Tick) {
        if !self.telemetry_rate.fire(now) {
            return;
        }
        match self.telemetry.refresh() {
            Ok(sample) => {
                self.snapshot = Some(Status::from_sample(
                    &sample,
                    &self.config.drivetrain,
                    self.config.schema,
                ));
                self.fresh = true;
            }
            Err(_) => {
                self.fresh = false;
                self.reporter.report(FaultCode::TelemetryRead, now);
            }
        }
    }

    fn send_status(&mut self, now: Tick) {
        if !self.status_rate.fire(now) {
            return;
        }
        let Some(status) = self.snapshot.filter(|_| self.fresh) else {
            trace!("no fresh telemetry, status not sent");
            return;
        };
        if let Err(e) = self.link.send(&Message::ReplyStatus(status)) {
            self.reporter.report(e.fault_code(), now);
        }
    }

    fn write_pulse(&mut self, us: u16) {
        self.pulse_us = us;
        self.actuator.set_pulse_width_us(us);
    }

    /// Pulse width last written to the actuator.
    pub fn pulse_us(&self) -> u16 {
        self.pulse_us
    }

    pub fn snapshot(&self) -> Option<&Status> {
        self.snapshot.as_ref()
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn failsafe(&self) -> &Failsafe {
        &self.failsafe
    }

    pub fn link(&self) -> &Link<R> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut Link<R> {
        &mut self.link
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn telemetry_mut(&mut self) -> &mut T {
        &mut self.telemetry
    }

    pub fn reporter(&self) -> &FaultReporter<'a, E> {
        &self.reporter
    }
}
