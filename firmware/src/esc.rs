use common::peripherals::{TelemetryError, TelemetrySource};
use common::telemetry::TelemetrySample;
use common::vesc::{self, MAX_PACKET_LEN};
use embassy_stm32::usart::BufferedUart;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker, with_timeout};
use embedded_io_async::{Read, Write};

// The VESC answers COMM_GET_VALUES within a few milliseconds, too slow to wait for inside
// the 1 ms control loop. A task polls it and leaves the latest result here.
static LATEST: Signal<CriticalSectionRawMutex, Result<TelemetrySample, TelemetryError>> =
    Signal::new();

/// Faster than the telemetry period so a fresh result is always waiting.
const POLL_PERIOD: Duration = Duration::from_millis(50);
const REPLY_TIMEOUT: Duration = Duration::from_millis(20);

async fn read_packet(uart: &mut BufferedUart<'static>) -> Result<TelemetrySample, TelemetryError> {
    let mut buf = [0u8; MAX_PACKET_LEN];
    let mut filled = 0;
    loop {
        let n = uart
            .read(&mut buf[filled..])
            .await
            .map_err(|_| TelemetryError::Framing)?;
        filled += n;
        if let Some(total) = vesc::packet_len(&buf[..filled])? {
            if total > MAX_PACKET_LEN {
                return Err(TelemetryError::Framing);
            }
            if filled >= total {
                return vesc::parse_values(&buf[..total]);
            }
        }
    }
}

async fn poll(uart: &mut BufferedUart<'static>) -> Result<TelemetrySample, TelemetryError> {
    let request = vesc::values_request()?;
    uart.write_all(&request)
        .await
        .map_err(|_| TelemetryError::Timeout)?;
    with_timeout(REPLY_TIMEOUT, read_packet(uart))
        .await
        .map_err(|_| TelemetryError::Timeout)?
}

#[embassy_executor::task]
pub async fn esc_task(mut uart: BufferedUart<'static>) -> ! {
    let mut ticker = Ticker::every(POLL_PERIOD);
    loop {
        let result = poll(&mut uart).await;
        if let Err(e) = result {
            defmt::debug!("vesc poll failed: {}", e);
            // Whatever is left of a late answer would desync the next read
            let mut junk = [0u8; 16];
            while let Ok(Ok(n)) = with_timeout(Duration::from_millis(2), uart.read(&mut junk)).await {
                if n == 0 {
                    break;
                }
            }
        }
        LATEST.signal(result);
        ticker.next().await;
    }
}

/// [`TelemetrySource`] backed by [`esc_task`].
pub struct Vesc;

impl TelemetrySource for Vesc {
    fn refresh(&mut self) -> Result<TelemetrySample, TelemetryError> {
        LATEST.try_take().unwrap_or(Err(TelemetryError::Timeout))
    }
}
