use core::fmt;

/// Error codes blinked by the annunciator and echoed on the diagnostic channel.
///
/// The numeric values are part of the field-facing contract: an operator reads them off
/// the status LED, so they must not be renumbered.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultCode {
    /// Not a fault. Reported once after bring-up, plays only the preamble.
    Ok = 0x0,
    RadioInit = 0x1,
    RadioChannel = 0x2,
    RadioPower = 0x3,
    RadioRecv = 0x4,
    RadioRecvEmpty = 0x5,
    IntegrityFailure = 0x6,
    Send = 0x7,
    SendAckTimeout = 0x8,
    ActuatorInit = 0x9,
    SafetyTimeout = 0xA,
    UnknownCommand = 0xB,
    TelemetryRead = 0xC,
    DisplayInit = 0xD,
    /// The diagnostic UART could not be brought up. Only the LED can report it.
    DiagnosticInit = 0xE,
}

impl FaultCode {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            FaultCode::Ok => "ok",
            FaultCode::RadioInit => "radio init",
            FaultCode::RadioChannel => "radio channel",
            FaultCode::RadioPower => "radio power",
            FaultCode::RadioRecv => "radio receive",
            FaultCode::RadioRecvEmpty => "empty frame",
            FaultCode::IntegrityFailure => "integrity failure",
            FaultCode::Send => "send",
            FaultCode::SendAckTimeout => "ack timeout",
            FaultCode::ActuatorInit => "actuator init",
            FaultCode::SafetyTimeout => "safety timeout",
            FaultCode::UnknownCommand => "unknown command",
            FaultCode::TelemetryRead => "telemetry read",
            FaultCode::DisplayInit => "display init",
            FaultCode::DiagnosticInit => "diagnostic port init",
        }
    }
}

impl TryFrom<u8> for FaultCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x0 => FaultCode::Ok,
            0x1 => FaultCode::RadioInit,
            0x2 => FaultCode::RadioChannel,
            0x3 => FaultCode::RadioPower,
            0x4 => FaultCode::RadioRecv,
            0x5 => FaultCode::RadioRecvEmpty,
            0x6 => FaultCode::IntegrityFailure,
            0x7 => FaultCode::Send,
            0x8 => FaultCode::SendAckTimeout,
            0x9 => FaultCode::ActuatorInit,
            0xA => FaultCode::SafetyTimeout,
            0xB => FaultCode::UnknownCommand,
            0xC => FaultCode::TelemetryRead,
            0xD => FaultCode::DisplayInit,
            0xE => FaultCode::DiagnosticInit,
            other => return Err(other),
        })
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x} ({})", self.code(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_survive_the_byte_conversion() {
        for raw in 0u8..=0xE {
            let code = FaultCode::try_from(raw).unwrap();
            assert_eq!(code.code(), raw);
        }
        assert_eq!(FaultCode::try_from(0xF), Err(0xF));
    }

    #[test]
    fn diagnostic_port_has_its_own_code() {
        assert_ne!(FaultCode::DiagnosticInit, FaultCode::DisplayInit);
        assert_eq!(
            FaultCode::DiagnosticInit.to_string(),
            "0xe (diagnostic port init)"
        );
    }

    #[test]
    fn display_shows_hex_and_name() {
        assert_eq!(FaultCode::SafetyTimeout.to_string(), "0xa (safety timeout)");
    }
}
