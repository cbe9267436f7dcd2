#![no_std]

pub mod board;
pub mod diag;
pub mod esc;
pub mod modem;
pub mod servo;
pub mod status_led;
pub mod throttle;

use common::codec::CipherKey;
use common::fault::FaultCode;

// Both boards must be built with the same key
const CIPHER_KEY: &str = match option_env!("RCLINK_CIPHER_KEY") {
    Some(key) => key,
    None => "rclink-dev-key",
};

pub fn cipher_key() -> Result<CipherKey, FaultCode> {
    CipherKey::new(CIPHER_KEY.as_bytes()).map_err(|e| e.fault_code())
}
