use anyhow::{Result, anyhow};
use common::Tick;
use common::annunciator::Annunciator;
use common::codec::{CipherKey, RawFrame};
use common::config::{HandsetConfig, RadioConfig, VehicleConfig};
use common::diag::{DiagMsg, Echo, MAX_DIAG_MSG_SIZE};
use common::fault::FaultCode;
use common::messages::{Status, StatusSchema};
use common::peripherals::{
    Actuator, Radio, RadioError, TelemetryError, TelemetrySource, ThrottleInput,
};
use common::session::{FaultReporter, Handset, Vehicle, bring_up};
use common::telemetry::TelemetrySample;
use heapless::Deque;
use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::profile::Profile;

// Both ends run in lockstep on a shared tick: the handset ticks first, then the vehicle.
// Each direction of the link is its own channel with its own seeded generator, so a run is
// fully determined by its options.

/// Frames a receiver holds before dropping new ones, as the radio's RX FIFO does.
const RX_FIFO_DEPTH: usize = 3;
/// Period of the annunciator interrupt on the boards.
const ANNUNCIATOR_PERIOD: Tick = 16;

pub struct SimOptions {
    pub ticks: Tick,
    pub seed: u64,
    /// Probability a frame is never acknowledged
    pub loss: f64,
    /// Probability one bit of a delivered frame flips
    pub corrupt: f64,
    pub schema: StatusSchema,
    pub key: CipherKey,
    pub profile: Profile,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AirStats {
    pub sent: usize,
    pub lost: usize,
    pub corrupted: usize,
    pub overflowed: usize,
}

struct Channel {
    rng: ChaCha8Rng,
    loss: f64,
    corrupt: f64,
    fifo: Deque<RawFrame, RX_FIFO_DEPTH>,
    stats: AirStats,
}

impl Channel {
    fn new(options: &SimOptions, seed: u64) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Channel {
            rng: ChaCha8Rng::seed_from_u64(seed),
            loss: options.loss,
            corrupt: options.corrupt,
            fifo: Deque::new(),
            stats: AirStats::default(),
        }))
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        self.stats.sent += 1;
        if self.rng.random_bool(self.loss) {
            self.stats.lost += 1;
            return Err(RadioError::AckTimeout);
        }

        let mut frame = RawFrame::from_slice(frame).map_err(|_| RadioError::Send)?;
        if !frame.is_empty() && self.rng.random_bool(self.corrupt) {
            let bit = self.rng.random_range(0..frame.len() * 8);
            frame[bit / 8] ^= 1 << (bit % 8);
            self.stats.corrupted += 1;
        }
        if self.fifo.push_back(frame).is_err() {
            self.stats.overflowed += 1;
        }
        Ok(())
    }
}

struct SimRadio {
    tx: Rc<RefCell<Channel>>,
    rx: Rc<RefCell<Channel>>,
}

impl Radio for SimRadio {
    fn init(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        debug!("sim radio up on channel {}", config.channel);
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        self.tx.borrow_mut().transmit(frame)
    }

    fn recv(&mut self) -> Result<Option<RawFrame>, RadioError> {
        Ok(self.rx.borrow_mut().fifo.pop_front())
    }
}

struct SimServo {
    pulse: Rc<Cell<u16>>,
}

impl Actuator for SimServo {
    fn set_pulse_width_us(&mut self, us: u16) {
        self.pulse.set(us);
    }
}

/// ESC model: everything scales with how far the pulse is from neutral.
struct SimEsc {
    pulse: Rc<Cell<u16>>,
    neutral_us: u16,
    tachometer: i32,
    tachometer_abs: i32,
}

impl TelemetrySource for SimEsc {
    fn refresh(&mut self) -> Result<TelemetrySample, TelemetryError> {
        let offset = self.pulse.get() as f32 - self.neutral_us as f32;
        let duty = (offset / 600.0).clamp(-1.0, 1.0);
        let rpm = duty * 30_000.0;

        let turns = (rpm / 600.0) as i32;
        self.tachometer += turns;
        self.tachometer_abs += turns.abs();

        Ok(TelemetrySample {
            temp_mosfet: 30.0 + 15.0 * duty.abs(),
            avg_motor_current: 25.0 * duty,
            avg_input_current: 12.0 * duty.abs(),
            duty_cycle_now: duty,
            rpm,
            inp_voltage: 25.2 - 1.5 * duty.abs(),
            tachometer: self.tachometer,
            tachometer_abs: self.tachometer_abs,
        })
    }
}

struct SimStick<'a> {
    profile: &'a Profile,
    clock: Rc<Cell<Tick>>,
}

impl ThrottleInput for SimStick<'_> {
    fn read(&mut self) -> i8 {
        self.profile.value_at(self.clock.get())
    }
}

/// Collects what a board would print on its diagnostic port.
#[derive(Default)]
struct DiagLog {
    faults: BTreeMap<u8, usize>,
    statuses: usize,
    messages: usize,
    stream: Vec<u8>,
}

impl Echo for DiagLog {
    fn echo(&mut self, msg: &DiagMsg) {
        self.messages += 1;
        match msg {
            DiagMsg::Report(code) | DiagMsg::Panic(code) => {
                *self.faults.entry(*code).or_default() += 1
            }
            DiagMsg::Status(_) => self.statuses += 1,
            DiagMsg::Boot => {}
        }

        let mut buf = [0u8; MAX_DIAG_MSG_SIZE];
        if let Ok(encoded) = msg.encode_cobs(&mut buf) {
            self.stream.push(0);
            self.stream.extend_from_slice(encoded);
        }
    }
}

/// Status pin, counting how often it lights up.
#[derive(Default)]
struct Led {
    level: bool,
    blinks: usize,
}

impl Led {
    fn step(&mut self, annunciator: &Annunciator, now: Tick) {
        let level = annunciator.step(now).unwrap_or(false);
        if level && !self.level {
            self.blinks += 1;
        }
        self.level = level;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimReport {
    pub ticks: Tick,
    pub uplink: AirStats,
    pub downlink: AirStats,
    pub vehicle_faults: BTreeMap<u8, usize>,
    pub handset_faults: BTreeMap<u8, usize>,
    pub pulse_min: u16,
    pub pulse_max: u16,
    pub final_pulse: u16,
    pub statuses: usize,
    pub last_status: Option<Status>,
    pub vehicle_blinks: usize,
    pub handset_blinks: usize,
}

impl SimReport {
    pub fn vehicle_count(&self, code: FaultCode) -> usize {
        self.vehicle_faults.get(&code.code()).copied().unwrap_or(0)
    }

    pub fn handset_count(&self, code: FaultCode) -> usize {
        self.handset_faults.get(&code.code()).copied().unwrap_or(0)
    }
}

fn write_faults(f: &mut fmt::Formatter<'_>, faults: &BTreeMap<u8, usize>) -> fmt::Result {
    for (&code, count) in faults {
        match FaultCode::try_from(code) {
            Ok(fault) => writeln!(f, "    {fault}: {count}")?,
            Err(_) => writeln!(f, "    0x{code:x}: {count}")?,
        }
    }
    Ok(())
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ticks", self.ticks)?;
        for (name, air) in [("uplink", &self.uplink), ("downlink", &self.downlink)] {
            writeln!(
                f,
                "{name}: {} sent, {} lost, {} corrupted, {} overflowed",
                air.sent, air.lost, air.corrupted, air.overflowed
            )?;
        }
        writeln!(
            f,
            "pulse: {}..={}us, final {}us",
            self.pulse_min, self.pulse_max, self.final_pulse
        )?;
        writeln!(f, "vehicle reports ({} blinks):", self.vehicle_blinks)?;
        write_faults(f, &self.vehicle_faults)?;
        writeln!(f, "handset reports ({} blinks):", self.handset_blinks)?;
        write_faults(f, &self.handset_faults)?;
        write!(f, "statuses received: {}", self.statuses)?;
        if let Some(status) = self.last_status {
            write!(f, "\nlast {}", DiagMsg::Status(status))?;
        }
        Ok(())
    }
}

pub struct SimOutcome {
    pub report: SimReport,
    /// Vehicle diagnostic port output, in the format `monitor` reads.
    pub diag_stream: Vec<u8>,
}

pub fn run(options: &SimOptions) -> Result<SimOutcome> {
    let radio_config = RadioConfig::default();
    let handset_config = HandsetConfig {
        schema: options.schema,
        ..HandsetConfig::default()
    };
    let vehicle_config = VehicleConfig {
        schema: options.schema,
        ..VehicleConfig::default()
    };

    let uplink = Channel::new(options, options.seed);
    let downlink = Channel::new(options, options.seed.wrapping_add(1));
    let mut handset_radio = SimRadio {
        tx: Rc::clone(&uplink),
        rx: Rc::clone(&downlink),
    };
    let mut vehicle_radio = SimRadio {
        tx: Rc::clone(&downlink),
        rx: Rc::clone(&uplink),
    };
    bring_up(&mut handset_radio, &radio_config)
        .map_err(|code| anyhow!("handset radio: {code}"))?;
    bring_up(&mut vehicle_radio, &radio_config)
        .map_err(|code| anyhow!("vehicle radio: {code}"))?;

    let clock = Rc::new(Cell::new(0));
    let pulse = Rc::new(Cell::new(vehicle_config.pulse.neutral_us));
    let handset_pin = Annunciator::new();
    let vehicle_pin = Annunciator::new();
    let (mut handset_led, mut vehicle_led) = (Led::default(), Led::default());

    let mut handset = Handset::new(
        handset_radio,
        options.key.clone(),
        SimStick {
            profile: &options.profile,
            clock: Rc::clone(&clock),
        },
        FaultReporter::new(&handset_pin, DiagLog::default()),
        handset_config,
    );
    let mut vehicle = Vehicle::new(
        vehicle_radio,
        options.key.clone(),
        SimServo {
            pulse: Rc::clone(&pulse),
        },
        SimEsc {
            pulse: Rc::clone(&pulse),
            neutral_us: vehicle_config.pulse.neutral_us,
            tachometer: 0,
            tachometer_abs: 0,
        },
        FaultReporter::new(&vehicle_pin, DiagLog::default()),
        vehicle_config,
    );

    info!(
        "Simulating {} ticks, seed {}, loss {}, corruption {}",
        options.ticks, options.seed, options.loss, options.corrupt
    );
    handset.start(0);
    vehicle.start(0);

    let (mut pulse_min, mut pulse_max) = (vehicle.pulse_us(), vehicle.pulse_us());
    for now in 1..=options.ticks {
        clock.set(now);
        handset.tick(now);
        vehicle.tick(now);

        pulse_min = pulse_min.min(vehicle.pulse_us());
        pulse_max = pulse_max.max(vehicle.pulse_us());
        if now % ANNUNCIATOR_PERIOD == 0 {
            handset_led.step(&handset_pin, now);
            vehicle_led.step(&vehicle_pin, now);
        }
    }

    let handset_log = handset.reporter().echo_sink();
    let vehicle_log = vehicle.reporter().echo_sink();
    let report = SimReport {
        ticks: options.ticks,
        uplink: uplink.borrow().stats,
        downlink: downlink.borrow().stats,
        vehicle_faults: vehicle_log.faults.clone(),
        handset_faults: handset_log.faults.clone(),
        pulse_min,
        pulse_max,
        final_pulse: vehicle.pulse_us(),
        statuses: handset_log.statuses,
        last_status: handset.status(options.ticks).copied(),
        vehicle_blinks: vehicle_led.blinks,
        handset_blinks: handset_led.blinks,
    };
    debug!("vehicle printed {} diagnostic messages", vehicle_log.messages);

    Ok(SimOutcome {
        report,
        diag_stream: vehicle_log.stream.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(loss: f64, corrupt: f64) -> SimOptions {
        SimOptions {
            ticks: 2_000,
            seed: 7,
            loss,
            corrupt,
            schema: StatusSchema::Narrow,
            key: CipherKey::new(b"sim-test-key").unwrap(),
            profile: Profile::constant(64),
        }
    }

    #[test]
    fn clean_link_follows_the_stick() {
        let report = run(&options(0.0, 0.0)).unwrap().report;

        assert_eq!(report.final_pulse, 1752);
        assert_eq!(report.pulse_max, 1752);
        assert_eq!(report.uplink.sent, 200);
        assert_eq!(report.downlink.sent, 20);
        // The status sent on the last tick is still in flight
        assert_eq!(report.statuses, 19);
        assert_eq!(report.vehicle_faults, BTreeMap::from([(0, 1)]));
        assert_eq!(report.handset_faults, BTreeMap::from([(0, 1)]));
        assert!(report.vehicle_blinks > 0);

        let status = report.last_status.unwrap();
        assert!(status.speed > 0);
        assert_eq!(status.extended, None);
    }

    #[test]
    fn dead_link_trips_the_failsafe_once() {
        let report = run(&options(1.0, 0.0)).unwrap().report;

        assert_eq!(report.final_pulse, 1400);
        assert_eq!(report.pulse_max, 1400);
        assert_eq!(report.vehicle_count(FaultCode::SafetyTimeout), 1);
        assert_eq!(report.handset_count(FaultCode::SendAckTimeout), 200);
        assert_eq!(report.uplink.lost, 200);
        assert_eq!(report.statuses, 0);
        assert!(report.last_status.is_none());
    }

    #[test]
    fn every_corrupted_frame_is_caught() {
        let report = run(&options(0.0, 1.0)).unwrap().report;

        assert_eq!(report.uplink.corrupted, 200);
        assert_eq!(report.vehicle_count(FaultCode::IntegrityFailure), 200);
        assert_eq!(report.vehicle_count(FaultCode::SafetyTimeout), 1);
        assert_eq!(report.final_pulse, 1400);
        assert_eq!(report.statuses, 0);
    }

    #[test]
    fn same_seed_same_run() {
        let a = run(&options(0.3, 0.05)).unwrap().report;
        let b = run(&options(0.3, 0.05)).unwrap().report;
        assert_eq!(a, b);
        assert!(a.uplink.lost > 0);
    }

    #[test]
    fn extended_schema_reaches_the_handset() {
        let mut options = options(0.0, 0.0);
        options.schema = StatusSchema::Extended;
        let report = run(&options).unwrap().report;

        let ext = report.last_status.and_then(|s| s.extended).unwrap();
        assert!(ext.rpm > 0);
        assert!(ext.tachometer_abs >= ext.tachometer);
    }

    #[test]
    fn diagnostic_stream_replays() {
        let outcome = run(&options(0.0, 1.0)).unwrap();
        let expected = 1 + outcome.report.vehicle_faults.values().sum::<usize>();
        assert_eq!(crate::monitor::replay(&outcome.diag_stream), expected);
    }
}
