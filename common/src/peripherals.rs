//! Hardware the link talks to. Implemented by the firmware board support, or by mocks and
//! the loopback simulator on the host.

use thiserror::Error;

use crate::Tick;
use crate::codec::RawFrame;
use crate::config::RadioConfig;
use crate::fault::FaultCode;
use crate::telemetry::TelemetrySample;

/// Free-running millisecond counter, wraps around.
pub trait Clock {
    fn now(&self) -> Tick;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    #[error("radio did not come up")]
    Init,
    #[error("channel rejected")]
    Channel,
    #[error("power level or data rate rejected")]
    Power,
    #[error("receive failed")]
    Recv,
    #[error("send failed")]
    Send,
    #[error("no acknowledgement")]
    AckTimeout,
}

impl RadioError {
    pub fn fault_code(&self) -> FaultCode {
        match self {
            RadioError::Init => FaultCode::RadioInit,
            RadioError::Channel => FaultCode::RadioChannel,
            RadioError::Power => FaultCode::RadioPower,
            RadioError::Recv => FaultCode::RadioRecv,
            RadioError::Send => FaultCode::Send,
            RadioError::AckTimeout => FaultCode::SendAckTimeout,
        }
    }
}

pub trait Radio {
    fn init(&mut self, config: &RadioConfig) -> Result<(), RadioError>;

    /// Transmit one frame. May block for a bounded acknowledgement wait.
    fn send(&mut self, frame: &[u8]) -> Result<(), RadioError>;

    /// Next received frame if one is waiting. Never blocks.
    fn recv(&mut self) -> Result<Option<RawFrame>, RadioError>;
}

/// PWM output to the servo or ESC.
pub trait Actuator {
    fn set_pulse_width_us(&mut self, us: u16);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryError {
    #[error("no reply from the ESC")]
    Timeout,
    #[error("malformed reply")]
    Framing,
    #[error("reply checksum mismatch")]
    Checksum,
}

pub trait TelemetrySource {
    fn refresh(&mut self) -> Result<TelemetrySample, TelemetryError>;
}

/// Handset stick position, already scaled to the full `i8` range.
pub trait ThrottleInput {
    fn read(&mut self) -> i8;

    /// Raw pot supply sample taken by the last `read`, for inputs that measure it.
    fn supply(&self) -> Option<u16> {
        None
    }
}
