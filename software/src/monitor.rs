use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use common::diag::{DiagDecoder, DiagMsg};
use common::fault::FaultCode;
use log::{error, info, warn};
use serialport::{DataBits, FlowControl, Parity, SerialPortType, StopBits};
use std::io::{ErrorKind, Read};
use std::time::Duration;

// Both boards print their diagnostic stream on the ST-Link virtual COM port, as
// zero-delimited postcard/COBS frames. The monitor can attach at any point of the stream.

pub fn find_port() -> Result<String> {
    let ports = serialport::available_ports().context("listing serial ports")?;
    for port in ports {
        if let SerialPortType::UsbPort(info) = port.port_type {
            if info.manufacturer.as_deref() == Some("STMicroelectronics") {
                info!("Chosen port {}", port.port_name);
                return Ok(port.port_name);
            }
        }
    }

    Err(anyhow!("ST-Link VCOM port not found"))
}

/// Human readable line for a diagnostic message, as the serial console used to print it.
pub fn describe(msg: &DiagMsg) -> String {
    match msg {
        DiagMsg::Report(code) | DiagMsg::Panic(code) => match FaultCode::try_from(*code) {
            Ok(fault) => format!("{msg} {}", fault.name()),
            Err(_) => format!("{msg} (unknown code)"),
        },
        _ => msg.to_string(),
    }
}

fn log_event(msg: &DiagMsg) {
    let stamp = Utc::now().format("%H:%M:%S%.3f");
    match msg {
        DiagMsg::Panic(_) => error!("[{}] {}", stamp, describe(msg)),
        DiagMsg::Report(code) if *code != FaultCode::Ok.code() => {
            warn!("[{}] {}", stamp, describe(msg))
        }
        _ => info!("[{}] {}", stamp, describe(msg)),
    }
}

pub fn run(port: Option<String>, baud: u32) -> Result<()> {
    let port_name = match port {
        Some(name) => name,
        None => find_port()?,
    };
    let mut port = serialport::new(&port_name, baud)
        .timeout(Duration::from_secs_f64(0.5))
        .flow_control(FlowControl::None)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .data_bits(DataBits::Eight)
        .open()
        .with_context(|| format!("opening {port_name}"))?;
    info!("Listening on {} at {} baud", port_name, baud);

    let mut decoder = DiagDecoder::new();
    let mut read_buffer = [0u8; 64];
    loop {
        match port.read(&mut read_buffer) {
            Ok(n) => decoder.feed(&read_buffer[..n], |msg| log_event(&msg)),
            // Boards are quiet between reports
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(e).context("reading diagnostic port"),
        }
    }
}

/// Decode and log a captured stream. Returns the number of messages found.
pub fn replay(bytes: &[u8]) -> usize {
    let mut decoder = DiagDecoder::new();
    let mut count = 0;
    decoder.feed(bytes, |msg| {
        log_event(&msg);
        count += 1;
    });
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_carry_the_fault_name() {
        assert_eq!(
            describe(&DiagMsg::Report(0xA)),
            "REPORT: 0xa safety timeout"
        );
        assert_eq!(describe(&DiagMsg::Panic(0x42)), "!PANIC: 0x42 (unknown code)");
        assert_eq!(describe(&DiagMsg::Boot), "BOOT");
    }

    #[test]
    fn replay_counts_whole_messages() {
        let mut stream = vec![0u8];
        let mut buf = [0u8; 48];
        for msg in [DiagMsg::Boot, DiagMsg::Report(0), DiagMsg::Report(6)] {
            stream.extend_from_slice(msg.encode_cobs(&mut buf).unwrap());
            stream.push(0);
        }
        // Cut off in the middle of the next one
        let tail = DiagMsg::Panic(1).encode_cobs(&mut buf).unwrap().len();
        stream.extend_from_slice(&buf[..tail / 2]);

        assert_eq!(replay(&stream), 3);
    }
}
