//! Just enough of the VESC UART protocol to poll `COMM_GET_VALUES`.
//!
//! Short packets only: `0x02, len, payload[len], crc16 (big endian), 0x03`, with the CRC
//! being CRC-16/XMODEM over the payload. Multi-byte fields are big endian fixed point.

use crc::{CRC_16_XMODEM, Crc};
use heapless::Vec;

use crate::peripherals::TelemetryError;
use crate::telemetry::TelemetrySample;

pub const COMM_GET_VALUES: u8 = 4;

const START_SHORT: u8 = 0x02;
const END: u8 = 0x03;
const OVERHEAD: usize = 5;
pub const MAX_PACKET_LEN: usize = 128;

/// Fields `COMM_GET_VALUES` must carry, command byte excluded. Newer firmware appends more.
const VALUES_LEN: usize = 53;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

pub type Packet = Vec<u8, MAX_PACKET_LEN>;

pub fn frame(payload: &[u8]) -> Result<Packet, TelemetryError> {
    if payload.len() + OVERHEAD > MAX_PACKET_LEN {
        return Err(TelemetryError::Framing);
    }
    let crc = CRC16.checksum(payload);

    let mut out = Packet::new();
    let fits = out.extend_from_slice(&[START_SHORT, payload.len() as u8]).is_ok()
        && out.extend_from_slice(payload).is_ok()
        && out.extend_from_slice(&crc.to_be_bytes()).is_ok()
        && out.push(END).is_ok();
    if !fits {
        return Err(TelemetryError::Framing);
    }
    Ok(out)
}

pub fn values_request() -> Result<Packet, TelemetryError> {
    frame(&[COMM_GET_VALUES])
}

/// Total length of the packet starting at `buf[0]`, once enough of it arrived to tell.
pub fn packet_len(buf: &[u8]) -> Result<Option<usize>, TelemetryError> {
    match buf {
        [] | [START_SHORT] => Ok(None),
        [START_SHORT, len, ..] => Ok(Some(*len as usize + OVERHEAD)),
        _ => Err(TelemetryError::Framing),
    }
}

/// Check framing and CRC, returning the payload.
pub fn unframe(packet: &[u8]) -> Result<&[u8], TelemetryError> {
    let total = packet_len(packet)?.ok_or(TelemetryError::Framing)?;
    if packet.len() != total || packet[total - 1] != END {
        return Err(TelemetryError::Framing);
    }
    let payload = &packet[2..total - 3];
    let crc = u16::from_be_bytes([packet[total - 3], packet[total - 2]]);
    if CRC16.checksum(payload) != crc {
        return Err(TelemetryError::Checksum);
    }
    Ok(payload)
}

pub fn parse_values(packet: &[u8]) -> Result<TelemetrySample, TelemetryError> {
    let payload = unframe(packet)?;
    let (&command, body) = payload.split_first().ok_or(TelemetryError::Framing)?;
    if command != COMM_GET_VALUES || body.len() < VALUES_LEN {
        return Err(TelemetryError::Framing);
    }

    let mut r = BigEndian { rest: body };
    let temp_mosfet = r.fixed16(10.0);
    let _temp_motor = r.fixed16(10.0);
    let avg_motor_current = r.fixed32(100.0);
    let avg_input_current = r.fixed32(100.0);
    r.skip(8); // avg id, avg iq
    let duty_cycle_now = r.fixed16(1000.0);
    let rpm = r.fixed32(1.0);
    let inp_voltage = r.fixed16(10.0);
    r.skip(16); // amp hours and watt hours, used and charged
    let tachometer = r.i32();
    let tachometer_abs = r.i32();

    Ok(TelemetrySample {
        temp_mosfet,
        avg_motor_current,
        avg_input_current,
        duty_cycle_now,
        rpm,
        inp_voltage,
        tachometer,
        tachometer_abs,
    })
}

// Length was checked by the caller
struct BigEndian<'a> {
    rest: &'a [u8],
}

impl BigEndian<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let (head, rest) = self.rest.split_at(N);
        self.rest = rest;
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        out
    }

    fn skip(&mut self, n: usize) {
        self.rest = &self.rest[n..];
    }

    fn i32(&mut self) -> i32 {
        i32::from_be_bytes(self.take())
    }

    fn fixed16(&mut self, scale: f32) -> f32 {
        i16::from_be_bytes(self.take()) as f32 / scale
    }

    fn fixed32(&mut self, scale: f32) -> f32 {
        self.i32() as f32 / scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn values_payload() -> Vec<u8> {
        let mut p = vec![COMM_GET_VALUES];
        p.extend_from_slice(&415i16.to_be_bytes()); // 41.5 C fet
        p.extend_from_slice(&300i16.to_be_bytes()); // motor temp
        p.extend_from_slice(&1237i32.to_be_bytes()); // 12.37 A
        p.extend_from_slice(&(-305i32).to_be_bytes()); // -3.05 A
        p.extend_from_slice(&[0u8; 8]);
        p.extend_from_slice(&500i16.to_be_bytes()); // 0.5 duty
        p.extend_from_slice(&21_000i32.to_be_bytes());
        p.extend_from_slice(&247i16.to_be_bytes()); // 24.7 V
        p.extend_from_slice(&[0u8; 16]);
        p.extend_from_slice(&5_000i32.to_be_bytes());
        p.extend_from_slice(&7_000i32.to_be_bytes());
        p.push(0); // fault code
        p
    }

    #[test]
    fn request_matches_the_known_packet() {
        assert_eq!(&values_request().unwrap()[..], &[0x02, 0x01, 0x04, 0x40, 0x84, 0x03]);
    }

    #[test]
    fn crc_is_xmodem() {
        assert_eq!(CRC16.checksum(b"123456789"), 0x31C3);
    }

    #[test]
    fn values_reply_parses() {
        let packet = frame(&values_payload()).unwrap();
        assert_eq!(packet_len(&packet[..2]), Ok(Some(packet.len())));

        let sample = parse_values(&packet).unwrap();
        assert!((sample.temp_mosfet - 41.5).abs() < 1e-4);
        assert!((sample.avg_motor_current - 12.37).abs() < 1e-4);
        assert!((sample.avg_input_current + 3.05).abs() < 1e-4);
        assert!((sample.duty_cycle_now - 0.5).abs() < 1e-4);
        assert_eq!(sample.rpm, 21_000.0);
        assert!((sample.inp_voltage - 24.7).abs() < 1e-4);
        assert_eq!(sample.tachometer, 5_000);
        assert_eq!(sample.tachometer_abs, 7_000);
    }

    #[test]
    fn corrupted_reply_is_rejected() {
        let mut packet = frame(&values_payload()).unwrap();
        packet[10] ^= 0x01;
        assert_eq!(parse_values(&packet), Err(TelemetryError::Checksum));
    }

    #[test]
    fn truncated_or_foreign_replies_are_rejected() {
        let packet = frame(&values_payload()).unwrap();
        assert_eq!(
            parse_values(&packet[..packet.len() - 1]),
            Err(TelemetryError::Framing)
        );
        assert_eq!(packet_len(&[0x55, 1]), Err(TelemetryError::Framing));
        assert_eq!(packet_len(&[0x02]), Ok(None));

        let short = frame(&[COMM_GET_VALUES, 1, 2, 3]).unwrap();
        assert_eq!(parse_values(&short), Err(TelemetryError::Framing));
    }
}
