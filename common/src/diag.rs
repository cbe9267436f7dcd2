use core::fmt;

use postcard::accumulator::{CobsAccumulator, FeedResult};
use serde::{Deserialize, Serialize};

use crate::messages::Status;

// Diagnostic messages are encoded by postcard in COBS mode, and a zero is sent before and
// after each message (duplicated zeroes are harmless and let a monitor attach on the fly).

pub const MAX_DIAG_MSG_SIZE: usize = 48;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiagMsg {
    Boot,
    Report(u8),
    Panic(u8),
    Status(Status),
}

impl DiagMsg {
    /// Encode into `buf`, trailing zero included.
    pub fn encode_cobs<'a>(&self, buf: &'a mut [u8]) -> postcard::Result<&'a mut [u8]> {
        postcard::to_slice_cobs(self, buf)
    }
}

impl fmt::Display for DiagMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagMsg::Boot => write!(f, "BOOT"),
            DiagMsg::Report(code) => write!(f, "REPORT: 0x{code:x}"),
            DiagMsg::Panic(code) => write!(f, "!PANIC: 0x{code:x}"),
            DiagMsg::Status(status) => write!(
                f,
                "STATUS: {}C motor {:.1}A batt {:.1}A {:.1}V {:.1}km/h",
                status.temp_fet,
                status.motor_current_a(),
                status.input_current_a(),
                status.input_voltage_v(),
                status.speed_kmh()
            ),
        }
    }
}

/// Where reports and status snapshots are echoed besides the status pin.
pub trait Echo {
    fn echo(&mut self, msg: &DiagMsg);
}

/// No diagnostic channel.
impl Echo for () {
    fn echo(&mut self, _msg: &DiagMsg) {}
}

impl<E: Echo + ?Sized> Echo for &mut E {
    fn echo(&mut self, msg: &DiagMsg) {
        (**self).echo(msg)
    }
}

/// Reassembles [`DiagMsg`]s from a raw serial byte stream.
pub struct DiagDecoder {
    acc: CobsAccumulator<MAX_DIAG_MSG_SIZE>,
}

impl Default for DiagDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagDecoder {
    pub const fn new() -> Self {
        Self {
            acc: CobsAccumulator::new(),
        }
    }

    /// Feed received bytes, calling `on_msg` for every complete message.
    ///
    /// Garbage between zeroes (or an oversized run) is skipped.
    pub fn feed<F: FnMut(DiagMsg)>(&mut self, bytes: &[u8], mut on_msg: F) {
        let mut window = bytes;
        while !window.is_empty() {
            window = match self.acc.feed::<DiagMsg>(window) {
                FeedResult::Consumed => break,
                FeedResult::OverFull(rest) => {
                    debug!("diagnostic frame overflow, resyncing");
                    rest
                }
                FeedResult::DeserError(rest) => rest,
                FeedResult::Success { data, remaining } => {
                    on_msg(data);
                    remaining
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::StatusExt;
    use std::string::ToString;
    use std::vec::Vec;

    fn status() -> Status {
        Status {
            temp_fet: 35,
            amps_motor: 153,
            amps_input: 21,
            duty_cycle: 90,
            speed: 141,
            volt_input: 246,
            extended: Some(StatusExt {
                rpm: 21_000,
                tachometer: -5,
                tachometer_abs: 1_000_000,
            }),
        }
    }

    #[test]
    fn text_matches_the_serial_console_format() {
        assert_eq!(DiagMsg::Report(0xB).to_string(), "REPORT: 0xb");
        assert_eq!(DiagMsg::Panic(0x1).to_string(), "!PANIC: 0x1");
        assert_eq!(
            DiagMsg::Status(status()).to_string(),
            "STATUS: 35C motor 15.3A batt 2.1A 24.6V 14.1km/h"
        );
    }

    #[test]
    fn largest_message_fits() {
        let mut buf = [0u8; MAX_DIAG_MSG_SIZE];
        let encoded = DiagMsg::Status(status()).encode_cobs(&mut buf).unwrap();
        assert_eq!(*encoded.last().unwrap(), 0);
        assert!(encoded[..encoded.len() - 1].iter().all(|b| *b != 0));
    }

    #[test]
    fn decoder_attaches_mid_stream() {
        let mut stream = Vec::new();
        // tail of a message we missed
        stream.extend_from_slice(&[0x03, 0x37, 0x42]);
        for msg in [DiagMsg::Boot, DiagMsg::Report(6), DiagMsg::Status(status())] {
            let mut buf = [0u8; MAX_DIAG_MSG_SIZE];
            stream.push(0);
            stream.extend_from_slice(msg.encode_cobs(&mut buf).unwrap());
        }

        let mut decoder = DiagDecoder::new();
        let mut seen = Vec::new();
        // arbitrary chunking, like a serial port read
        for chunk in stream.chunks(5) {
            decoder.feed(chunk, |msg| seen.push(msg));
        }

        assert_eq!(
            seen,
            [DiagMsg::Boot, DiagMsg::Report(6), DiagMsg::Status(status())]
        );
    }
}
