//! The per-tick control loop of both endpoints.
//!
//! Each call to `tick` does a bounded amount of work: one failsafe check, at most one
//! received frame, and whichever rate-limited sends are due. Faults found during a tick are
//! reported and the tick carries on; nothing is queued for later.

mod failsafe;
mod handset;
mod rate;
mod vehicle;

use thiserror::Error;

pub use failsafe::{Failsafe, FailsafeCheck};
pub use handset::{Handset, battery_centivolts_from_adc, throttle_from_adc};
pub use rate::RateLimiter;
pub use vehicle::Vehicle;

use crate::Tick;
use crate::annunciator::Annunciator;
use crate::codec::{CipherKey, CodecError, decode_frame, encode_frame};
use crate::config::RadioConfig;
use crate::diag::{DiagMsg, Echo};
use crate::fault::FaultCode;
use crate::messages::{Message, ProtocolError, StatusSchema, decode_message, encode_message};
use crate::peripherals::{Radio, RadioError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    #[error("radio: {0}")]
    Radio(#[from] RadioError),
    #[error("frame: {0}")]
    Codec(#[from] CodecError),
    #[error("message: {0}")]
    Protocol(#[from] ProtocolError),
}

impl LinkError {
    pub fn fault_code(&self) -> FaultCode {
        match self {
            LinkError::Radio(e) => e.fault_code(),
            LinkError::Codec(e) => e.fault_code(),
            LinkError::Protocol(e) => e.fault_code(),
        }
    }
}

/// Bring the radio up. The returned code is meant for [`Annunciator::halt`].
pub fn bring_up<R: Radio>(radio: &mut R, config: &RadioConfig) -> Result<(), FaultCode> {
    radio.init(config).map_err(|e| {
        error!("radio bring-up failed: {}", e.fault_code());
        e.fault_code()
    })?;
    info!("radio up on channel {}", config.channel);
    Ok(())
}

/// Radio plus everything both ends must agree on to understand each other.
pub struct Link<R> {
    radio: R,
    key: CipherKey,
    schema: StatusSchema,
}

impl<R: Radio> Link<R> {
    pub fn new(radio: R, key: CipherKey, schema: StatusSchema) -> Self {
        Self { radio, key, schema }
    }

    pub fn send(&mut self, message: &Message) -> Result<(), LinkError> {
        let payload = encode_message(message, self.schema)?;
        let frame = encode_frame(&payload, &self.key)?;
        self.radio.send(&frame)?;
        Ok(())
    }

    /// Take at most one frame off the radio and decode it.
    pub fn poll(&mut self) -> Result<Option<Message>, LinkError> {
        let Some(frame) = self.radio.recv()? else {
            return Ok(None);
        };
        let payload = decode_frame(&frame, &self.key)?;
        Ok(Some(decode_message(&payload, self.schema)?))
    }

    pub fn schema(&self) -> StatusSchema {
        self.schema
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }
}

/// Control-loop side of fault reporting: blink it if the pin is free, echo it always.
pub struct FaultReporter<'a, E> {
    annunciator: &'a Annunciator,
    echo: E,
    last: Option<(FaultCode, Tick)>,
}

impl<'a, E: Echo> FaultReporter<'a, E> {
    pub fn new(annunciator: &'a Annunciator, echo: E) -> Self {
        Self {
            annunciator,
            echo,
            last: None,
        }
    }

    pub fn report(&mut self, code: FaultCode, now: Tick) {
        if code == FaultCode::Ok {
            info!("report {}", code);
        } else {
            warn!("report {}", code);
        }
        self.echo.echo(&DiagMsg::Report(code.code()));
        self.last = Some((code, now));

        if !self.annunciator.report(code, now) {
            trace!("status pin busy, {} not blinked", code);
        }
    }

    pub fn echo(&mut self, msg: &DiagMsg) {
        self.echo.echo(msg);
    }

    /// Last reported code if it is younger than `window` ticks.
    pub fn recent(&self, now: Tick, window: Tick) -> Option<FaultCode> {
        match self.last {
            Some((code, at)) if now.wrapping_sub(at) < window => Some(code),
            _ => None,
        }
    }

    pub fn annunciator(&self) -> &'a Annunciator {
        self.annunciator
    }

    pub fn echo_sink(&self) -> &E {
        &self.echo
    }
}
