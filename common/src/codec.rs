//! Link-layer framing: CRC-8 trailer and the repeating-key XOR cipher.
//!
//! Frame layout on air:
//!
//! | bytes           | content                                            |
//! |-----------------|----------------------------------------------------|
//! | `0..len`        | payload, XOR-ciphered with the shared key          |
//! | `len`           | CRC-8 (Dallas/Maxim) of the *plaintext* payload    |
//!
//! The cipher walks `max(key_len, payload_len)` key bytes over the payload, wrapping at
//! the payload length. Short payloads therefore get the whole key folded into them; the
//! trailer is never ciphered. Both endpoints must do exactly this or nothing decodes.
//!
//! WARNING: this is a fixed-key XOR stream with no nonce and no key rotation. It keeps
//! casual listeners from reading throttle values, nothing more.

use core::fmt;

use crc::{CRC_8_MAXIM_DOW, Crc};
use heapless::Vec;
use thiserror::Error;

use crate::fault::FaultCode;

/// Largest frame the radio carries, trailer included.
pub const MTU: usize = 32;
pub const MAX_PAYLOAD_LEN: usize = MTU - 1;

pub const MIN_KEY_LEN: usize = 4;
pub const MAX_KEY_LEN: usize = 32;

pub type RawFrame = Vec<u8, MTU>;
pub type Payload = Vec<u8, MAX_PAYLOAD_LEN>;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    #[error("empty payload")]
    Empty,

    #[error("payload of {len} bytes does not fit a 32 byte frame")]
    TooLarge { len: usize },

    #[error("received frame of {len} bytes exceeds the 32 byte MTU")]
    FrameTooLarge { len: usize },

    #[error("checksum mismatch: trailer {expected:#04x}, computed {actual:#04x}")]
    Integrity { expected: u8, actual: u8 },

    #[error("cipher key must be 4 to 32 bytes, got {len}")]
    BadKeyLength { len: usize },
}

impl CodecError {
    pub fn fault_code(&self) -> FaultCode {
        match self {
            CodecError::Empty => FaultCode::RadioRecvEmpty,
            CodecError::TooLarge { .. } => FaultCode::Send,
            CodecError::FrameTooLarge { .. } => FaultCode::RadioRecv,
            CodecError::Integrity { .. } => FaultCode::IntegrityFailure,
            CodecError::BadKeyLength { .. } => FaultCode::RadioInit,
        }
    }
}

/// Shared secret of one transmitter/receiver pair.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey(Vec<u8, MAX_KEY_LEN>);

impl CipherKey {
    pub fn new(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < MIN_KEY_LEN {
            return Err(CodecError::BadKeyLength { len: bytes.len() });
        }
        Vec::from_slice(bytes)
            .map(CipherKey)
            .map_err(|_| CodecError::BadKeyLength { len: bytes.len() })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// Never print the key itself
impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherKey({} bytes)", self.0.len())
    }
}

pub fn checksum(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// XOR `data` with the key in place. Applying it twice restores the input.
pub fn apply_cipher(data: &mut [u8], key: &CipherKey) {
    let size = data.len();
    if size == 0 {
        return;
    }
    let key = key.as_bytes();
    for i in 0..size.max(key.len()) {
        data[i % size] ^= key[i % key.len()];
    }
}

pub fn encode_frame(payload: &[u8], key: &CipherKey) -> Result<RawFrame, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::Empty);
    }
    if payload.len() + 1 > MTU {
        return Err(CodecError::TooLarge { len: payload.len() });
    }

    let crc = checksum(payload);
    let mut frame = RawFrame::from_slice(payload)
        .map_err(|_| CodecError::TooLarge { len: payload.len() })?;
    apply_cipher(&mut frame, key);
    frame
        .push(crc)
        .map_err(|_| CodecError::TooLarge { len: payload.len() })?;

    Ok(frame)
}

/// Undo [`encode_frame`]. A failed check means the frame is dropped; nothing is retried.
pub fn decode_frame(frame: &[u8], key: &CipherKey) -> Result<Payload, CodecError> {
    let Some((&trailer, body)) = frame.split_last() else {
        return Err(CodecError::Empty);
    };
    if body.is_empty() {
        return Err(CodecError::Empty);
    }

    let mut payload =
        Payload::from_slice(body).map_err(|_| CodecError::FrameTooLarge { len: frame.len() })?;
    apply_cipher(&mut payload, key);

    let actual = checksum(&payload);
    if actual != trailer {
        return Err(CodecError::Integrity {
            expected: trailer,
            actual,
        });
    }

    Ok(payload)
}
