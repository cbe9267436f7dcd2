//! Command and telemetry messages carried inside a frame payload.
//!
//! Every message is `id` followed by fixed-width little-endian fields, no padding:
//!
//! | id | message       | body                                                      |
//! |----|---------------|-----------------------------------------------------------|
//! | 1  | `SetPwm`      | `value: i8`                                               |
//! | 2  | `ReplyStatus` | narrow: `temp_fet i8, amps_motor i16, amps_input i16,`    |
//! |    |               | `duty_cycle u8, speed u8, volt_input i16`                 |
//! |    |               | extended: narrow + `rpm i32, tachometer i32,`             |
//! |    |               | `tachometer_abs i32`                                      |
//!
//! The two status layouts are not interchangeable and nothing on the wire says which one
//! is in use. Both ends of a deployment are built with the same [`StatusSchema`].

use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{MAX_PAYLOAD_LEN, Payload};
use crate::fault::FaultCode;

pub const SET_PWM_ID: u8 = 1;
pub const REPLY_STATUS_ID: u8 = 2;

const NARROW_STATUS_LEN: usize = 1 + 2 + 2 + 1 + 1 + 2;
const EXTENDED_STATUS_LEN: usize = NARROW_STATUS_LEN + 3 * 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusSchema {
    #[default]
    Narrow,
    Extended,
}

impl StatusSchema {
    /// Body length of a `ReplyStatus`, discriminant excluded.
    pub const fn status_len(self) -> usize {
        match self {
            StatusSchema::Narrow => NARROW_STATUS_LEN,
            StatusSchema::Extended => EXTENDED_STATUS_LEN,
        }
    }
}

/// Fields only present in the extended schema.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusExt {
    pub rpm: i32,
    pub tachometer: i32,
    pub tachometer_abs: i32,
}

/// Telemetry snapshot in wire units, see [`crate::telemetry`] for the scale factors.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// °C
    pub temp_fet: i8,
    /// Tenths of an amp
    pub amps_motor: i16,
    /// Tenths of an amp
    pub amps_input: i16,
    /// Fraction of 255
    pub duty_cycle: u8,
    /// Tenths of km/h
    pub speed: u8,
    /// Tenths of a volt
    pub volt_input: i16,
    pub extended: Option<StatusExt>,
}

impl Status {
    pub fn schema(&self) -> StatusSchema {
        match self.extended {
            Some(_) => StatusSchema::Extended,
            None => StatusSchema::Narrow,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message {
    SetPwm { value: i8 },
    ReplyStatus(Status),
}

impl Message {
    pub fn id(&self) -> u8 {
        match self {
            Message::SetPwm { .. } => SET_PWM_ID,
            Message::ReplyStatus(_) => REPLY_STATUS_ID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    #[error("empty payload")]
    Empty,

    #[error("unknown message id {0}")]
    UnknownId(u8),

    #[error("message {id} needs {expected} body bytes, got {actual}")]
    BadLength {
        id: u8,
        expected: usize,
        actual: usize,
    },

    #[error("status does not match the {0:?} schema")]
    SchemaMismatch(StatusSchema),
}

impl ProtocolError {
    pub fn fault_code(&self) -> FaultCode {
        match self {
            // Raised while encoding our own status, never by a received frame
            ProtocolError::SchemaMismatch(_) => FaultCode::Send,
            _ => FaultCode::UnknownCommand,
        }
    }
}

pub fn encode_message(message: &Message, schema: StatusSchema) -> Result<Payload, ProtocolError> {
    let mut out = Writer::default();
    out.put(&[message.id()]);

    match message {
        Message::SetPwm { value } => out.put(&value.to_le_bytes()),
        Message::ReplyStatus(status) => {
            if status.schema() != schema {
                return Err(ProtocolError::SchemaMismatch(schema));
            }
            out.put(&status.temp_fet.to_le_bytes());
            out.put(&status.amps_motor.to_le_bytes());
            out.put(&status.amps_input.to_le_bytes());
            out.put(&[status.duty_cycle, status.speed]);
            out.put(&status.volt_input.to_le_bytes());
            if let Some(ext) = &status.extended {
                out.put(&ext.rpm.to_le_bytes());
                out.put(&ext.tachometer.to_le_bytes());
                out.put(&ext.tachometer_abs.to_le_bytes());
            }
        }
    }

    Ok(out.finish())
}

pub fn decode_message(bytes: &[u8], schema: StatusSchema) -> Result<Message, ProtocolError> {
    let (&id, body) = bytes.split_first().ok_or(ProtocolError::Empty)?;

    match id {
        SET_PWM_ID => {
            let mut fields = Fields::exact(id, body, 1)?;
            Ok(Message::SetPwm {
                value: fields.i8(),
            })
        }
        REPLY_STATUS_ID => {
            let mut fields = Fields::exact(id, body, schema.status_len())?;
            let mut status = Status {
                temp_fet: fields.i8(),
                amps_motor: fields.i16(),
                amps_input: fields.i16(),
                duty_cycle: fields.u8(),
                speed: fields.u8(),
                volt_input: fields.i16(),
                extended: None,
            };
            if schema == StatusSchema::Extended {
                status.extended = Some(StatusExt {
                    rpm: fields.i32(),
                    tachometer: fields.i32(),
                    tachometer_abs: fields.i32(),
                });
            }
            Ok(Message::ReplyStatus(status))
        }
        other => Err(ProtocolError::UnknownId(other)),
    }
}

// Longest message is 22 bytes, well inside a payload
#[derive(Default)]
struct Writer {
    buf: [u8; MAX_PAYLOAD_LEN],
    len: usize,
}

impl Writer {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }

    fn finish(self) -> Payload {
        let mut out = Vec::new();
        out.extend(self.buf[..self.len].iter().copied());
        out
    }
}

/// Field reader over a body whose length was checked up front.
struct Fields<'a> {
    rest: &'a [u8],
}

impl<'a> Fields<'a> {
    fn exact(id: u8, body: &'a [u8], expected: usize) -> Result<Self, ProtocolError> {
        if body.len() != expected {
            return Err(ProtocolError::BadLength {
                id,
                expected,
                actual: body.len(),
            });
        }
        Ok(Fields { rest: body })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let (head, rest) = self.rest.split_at(N);
        self.rest = rest;
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn i8(&mut self) -> i8 {
        i8::from_le_bytes(self.take())
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrow_status() -> Status {
        Status {
            temp_fet: -12,
            amps_motor: 153,
            amps_input: -40,
            duty_cycle: 200,
            speed: 87,
            volt_input: 252,
            extended: None,
        }
    }

    fn extended_status() -> Status {
        Status {
            extended: Some(StatusExt {
                rpm: -21_000,
                tachometer: 123_456,
                tachometer_abs: i32::MAX,
            }),
            ..narrow_status()
        }
    }

    #[test]
    fn set_pwm_layout() {
        let bytes = encode_message(&Message::SetPwm { value: 64 }, StatusSchema::Narrow).unwrap();
        assert_eq!(&bytes[..], &[1, 64]);

        let bytes = encode_message(&Message::SetPwm { value: -1 }, StatusSchema::Narrow).unwrap();
        assert_eq!(&bytes[..], &[1, 0xff]);
    }

    #[test]
    fn set_pwm_round_trips_every_value() {
        for value in i8::MIN..=i8::MAX {
            let message = Message::SetPwm { value };
            for schema in [StatusSchema::Narrow, StatusSchema::Extended] {
                let bytes = encode_message(&message, schema).unwrap();
                assert_eq!(decode_message(&bytes, schema), Ok(message));
            }
        }
    }

    #[test]
    fn narrow_status_layout() {
        let bytes = encode_message(&Message::ReplyStatus(narrow_status()), StatusSchema::Narrow)
            .unwrap();
        assert_eq!(
            &bytes[..],
            &[2, 0xf4, 153, 0, 0xd8, 0xff, 200, 87, 252, 0]
        );
        assert_eq!(bytes.len(), 1 + StatusSchema::Narrow.status_len());
    }

    #[test]
    fn status_round_trips_in_both_schemas() {
        let narrow = Message::ReplyStatus(narrow_status());
        let bytes = encode_message(&narrow, StatusSchema::Narrow).unwrap();
        assert_eq!(decode_message(&bytes, StatusSchema::Narrow), Ok(narrow));

        let extended = Message::ReplyStatus(extended_status());
        let bytes = encode_message(&extended, StatusSchema::Extended).unwrap();
        assert_eq!(bytes.len(), 22);
        assert_eq!(decode_message(&bytes, StatusSchema::Extended), Ok(extended));
    }

    #[test]
    fn status_must_match_the_deployment_schema() {
        assert_eq!(
            encode_message(&Message::ReplyStatus(narrow_status()), StatusSchema::Extended),
            Err(ProtocolError::SchemaMismatch(StatusSchema::Extended))
        );
        assert_eq!(
            encode_message(&Message::ReplyStatus(extended_status()), StatusSchema::Narrow),
            Err(ProtocolError::SchemaMismatch(StatusSchema::Narrow))
        );
    }

    #[test]
    fn only_received_garbage_counts_as_unknown_command() {
        assert_eq!(
            ProtocolError::UnknownId(9).fault_code(),
            FaultCode::UnknownCommand
        );
        assert_eq!(
            ProtocolError::SchemaMismatch(StatusSchema::Narrow).fault_code(),
            FaultCode::Send
        );
    }

    #[test]
    fn narrow_frame_does_not_decode_as_extended() {
        let bytes = encode_message(&Message::ReplyStatus(narrow_status()), StatusSchema::Narrow)
            .unwrap();
        assert_eq!(
            decode_message(&bytes, StatusSchema::Extended),
            Err(ProtocolError::BadLength {
                id: 2,
                expected: 21,
                actual: 9
            })
        );
    }

    #[test]
    fn unknown_ids_are_rejected() {
        for id in [0u8, 3, 0x7f, 0xff] {
            assert_eq!(
                decode_message(&[id, 0], StatusSchema::Narrow),
                Err(ProtocolError::UnknownId(id))
            );
        }
        assert_eq!(
            decode_message(&[], StatusSchema::Narrow),
            Err(ProtocolError::Empty)
        );
    }

    #[test]
    fn set_pwm_with_trailing_bytes_is_rejected() {
        assert_eq!(
            decode_message(&[1, 10, 10], StatusSchema::Narrow),
            Err(ProtocolError::BadLength {
                id: 1,
                expected: 1,
                actual: 2
            })
        );
    }
}
