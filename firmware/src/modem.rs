//! Transparent UART radio modem (HC-12 style) as the link [`Radio`].
//!
//! The modem forwards whatever is written to its UART, so frame boundaries are restored
//! with the same scheme the diagnostic port uses: each frame is a postcard-encoded byte
//! vector in COBS form, with a zero before and after it. Bytes are only ever read when
//! already buffered, so `recv` never waits.

use core::fmt::Write as _;

use common::codec::{MTU, RawFrame};
use common::config::{DataRate, PaLevel, RadioConfig};
use common::peripherals::{Radio, RadioError};
use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Instant, block_for};
use embedded_io::{Read, ReadReady, Write};
use heapless::{Deque, String};
use postcard::accumulator::{CobsAccumulator, FeedResult};

// postcard length prefix plus COBS overhead and delimiter
const WIRE_FRAME_SIZE: usize = MTU + 4;
/// Frames decoded but not yet taken by the control loop.
const RX_QUEUE_DEPTH: usize = 3;

const REPLY_TIMEOUT: Duration = Duration::from_millis(100);
const HIGHEST_CHANNEL: u8 = 127;

pub struct Modem<U> {
    uart: U,
    set_pin: Output<'static>,
    acc: CobsAccumulator<WIRE_FRAME_SIZE>,
    queue: Deque<RawFrame, RX_QUEUE_DEPTH>,
}

impl<U: Read + ReadReady + Write> Modem<U> {
    pub fn new(uart: U, set_pin: Output<'static>) -> Self {
        Self {
            uart,
            set_pin,
            acc: CobsAccumulator::new(),
            queue: Deque::new(),
        }
    }

    /// Send one AT command and check the modem answered `OK...`.
    fn command(&mut self, cmd: &str, on_refusal: RadioError) -> Result<(), RadioError> {
        defmt::debug!("modem <- {}", cmd);
        self.uart
            .write_all(cmd.as_bytes())
            .and_then(|_| self.uart.flush())
            .map_err(|_| RadioError::Init)?;

        let mut reply: String<24> = String::new();
        let deadline = Instant::now() + REPLY_TIMEOUT;
        loop {
            if Instant::now() > deadline {
                defmt::warn!("modem did not answer {}", cmd);
                return Err(RadioError::Init);
            }
            if !self.uart.read_ready().map_err(|_| RadioError::Init)? {
                continue;
            }
            let mut byte = [0u8];
            self.uart.read(&mut byte).map_err(|_| RadioError::Init)?;
            match byte[0] {
                b'\n' => break,
                b'\r' => {}
                b => {
                    if reply.push(b as char).is_err() {
                        break;
                    }
                }
            }
        }

        defmt::debug!("modem -> {}", reply.as_str());
        if reply.starts_with("OK") {
            Ok(())
        } else {
            Err(on_refusal)
        }
    }

    fn configure(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        if config.channel == 0 || config.channel > HIGHEST_CHANNEL {
            return Err(RadioError::Channel);
        }
        // Air rate follows the UART rate in FU3 mode; 115200 baud gives ~250 kbps
        let baud = match config.data_rate {
            DataRate::Kbps250 => "AT+B115200",
            DataRate::Mbps1 | DataRate::Mbps2 => return Err(RadioError::Init),
        };
        let power = match config.power {
            PaLevel::Min => 1,
            PaLevel::Low => 4,
            PaLevel::High => 6,
            PaLevel::Max => 8,
        };

        let mut cmd: String<16> = String::new();
        self.command("AT", RadioError::Init)?;
        self.command("AT+FU3", RadioError::Init)?;
        self.command(baud, RadioError::Init)?;
        write!(cmd, "AT+C{:03}", config.channel).map_err(|_| RadioError::Channel)?;
        self.command(&cmd, RadioError::Channel)?;
        cmd.clear();
        write!(cmd, "AT+P{}", power).map_err(|_| RadioError::Power)?;
        self.command(&cmd, RadioError::Power)
    }
}

impl<U: Read + ReadReady + Write> Radio for Modem<U> {
    fn init(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        // SET low puts the modem in command mode
        self.set_pin.set_low();
        block_for(Duration::from_millis(40));
        let result = self.configure(config);
        self.set_pin.set_high();
        block_for(Duration::from_millis(80));
        result
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        let frame = RawFrame::from_slice(frame).map_err(|_| RadioError::Send)?;
        let mut buf = [0u8; WIRE_FRAME_SIZE + 1];
        let encoded = postcard::to_slice_cobs(&frame, &mut buf[1..]).map_err(|_| RadioError::Send)?;
        let len = encoded.len() + 1;
        self.uart.write_all(&buf[..len]).map_err(|_| RadioError::Send)
    }

    fn recv(&mut self) -> Result<Option<RawFrame>, RadioError> {
        let mut garbled = false;
        let mut buf = [0u8; 32];
        while self.uart.read_ready().map_err(|_| RadioError::Recv)? {
            let n = self.uart.read(&mut buf).map_err(|_| RadioError::Recv)?;
            let mut window = &buf[..n];
            while !window.is_empty() {
                window = match self.acc.feed::<RawFrame>(window) {
                    FeedResult::Consumed => break,
                    FeedResult::OverFull(rest) | FeedResult::DeserError(rest) => {
                        garbled = true;
                        rest
                    }
                    FeedResult::Success { data, remaining } => {
                        if self.queue.push_back(data).is_err() {
                            defmt::warn!("radio rx queue full, frame dropped");
                        }
                        remaining
                    }
                };
            }
        }

        match self.queue.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if garbled => Err(RadioError::Recv),
            None => Ok(None),
        }
    }
}
