//! Radio link shared by the handset and the vehicle: frame codec, messages, fault
//! annunciation and the control loops of both ends.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod annunciator;
pub mod codec;
pub mod config;
pub mod diag;
pub mod fault;
pub mod messages;
pub mod peripherals;
pub mod session;
pub mod telemetry;
pub mod vesc;

/// Milliseconds from a free-running counter. Wraps after ~49 days; all arithmetic on
/// ticks is wrapping.
pub type Tick = u32;

pub use annunciator::Annunciator;
pub use codec::{CipherKey, CodecError, RawFrame};
pub use fault::FaultCode;
pub use messages::{Message, ProtocolError, Status, StatusSchema};
