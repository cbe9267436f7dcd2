use common::annunciator::Annunciator;
use common::peripherals::Clock;
use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Ticker};

use crate::board::Uptime;

/// Shared between the control loop (which reports) and the LED task (which plays).
pub static ANNUNCIATOR: Annunciator = Annunciator::new();

const STEP_PERIOD: Duration = Duration::from_millis(16);

/// Runs on the interrupt executor so the pattern keeps its timing even when the thread
/// executor is stuck in `halt`.
#[embassy_executor::task]
pub async fn status_led_task(mut led: Output<'static>) -> ! {
    let mut ticker = Ticker::every(STEP_PERIOD);
    loop {
        match ANNUNCIATOR.step(Uptime.now()) {
            Some(true) => led.set_high(),
            _ => led.set_low(),
        }
        ticker.next().await;
    }
}
