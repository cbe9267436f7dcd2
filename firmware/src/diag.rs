use common::diag::{DiagMsg, Echo, MAX_DIAG_MSG_SIZE};
use embassy_stm32::mode::Async;
use embassy_stm32::usart::UartTx;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;

// Diagnostic messages go to the ST-Link VCOM port as zero-delimited postcard/COBS frames,
// in the same format the host monitor decodes.

const PIPE_SIZE: usize = 256;

static DIAG_PIPE: Pipe<CriticalSectionRawMutex, PIPE_SIZE> = Pipe::new();

/// Echo sink for the control loop. Never blocks: messages that don't fit are dropped.
pub struct DiagPort;

impl Echo for DiagPort {
    fn echo(&mut self, msg: &DiagMsg) {
        defmt::info!("{}", msg);

        let mut buf = [0u8; MAX_DIAG_MSG_SIZE + 1];
        let Ok(encoded) = msg.encode_cobs(&mut buf[1..]) else {
            return;
        };
        let len = encoded.len() + 1;
        if DIAG_PIPE.free_capacity() < len {
            defmt::warn!("diagnostic port backed up, message dropped");
            return;
        }
        // Cannot be short, the free capacity was checked
        let _ = DIAG_PIPE.try_write(&buf[..len]);
    }
}

#[embassy_executor::task]
pub async fn diag_task(mut uart: UartTx<'static, Async>) -> ! {
    let mut buf = [0u8; 64];
    loop {
        let n = DIAG_PIPE.read(&mut buf).await;
        if let Err(e) = uart.write(&buf[..n]).await {
            defmt::warn!("diagnostic write failed: {}", e);
        }
    }
}
