#![no_std]
#![no_main]

use common::config::{HandsetConfig, RadioConfig};
use common::fault::FaultCode;
use common::peripherals::Clock;
use common::session::{FaultReporter, Handset, bring_up};
use defmt::*;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::adc::{Adc, AdcChannel};
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::usart::{self, BufferedUart, UartTx};
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_time::{Duration, Ticker};
use rclink_firmware::board::{self, Uptime};
use rclink_firmware::diag::{DiagPort, diag_task};
use rclink_firmware::modem::Modem;
use rclink_firmware::status_led::{ANNUNCIATOR, status_led_task};
use rclink_firmware::throttle::Stick;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    USART1 => usart::BufferedInterruptHandler<peripherals::USART1>;
});

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn UART4() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

const LOOP_PERIOD: Duration = Duration::from_millis(1);
const WATCHDOG_TIMEOUT_US: u32 = 50_000;
/// How often the latest telemetry is printed while it is fresh.
const STATUS_PRINT_PERIOD: u32 = 500;

static MODEM_TX: StaticCell<[u8; 128]> = StaticCell::new();
static MODEM_RX: StaticCell<[u8; 128]> = StaticCell::new();

fn halt(code: FaultCode) -> ! {
    ANNUNCIATOR.halt(code, &Uptime, &mut DiagPort)
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_stm32::init(board::config());
    info!("handset starting");

    interrupt::UART4.set_priority(Priority::P6);
    let high = EXECUTOR_HIGH.start(interrupt::UART4);
    let led = Output::new(p.PD10, Level::Low, Speed::Low);
    high.spawn(unwrap!(status_led_task(led)));
    let diag_uart = match UartTx::new(p.USART3, p.PB10, p.GPDMA1_CH0, usart::Config::default()) {
        Ok(uart) => uart,
        Err(e) => {
            error!("diagnostic port: {}", e);
            halt(FaultCode::DiagnosticInit)
        }
    };
    high.spawn(unwrap!(diag_task(diag_uart)));

    let config = HandsetConfig::default();
    let key = rclink_firmware::cipher_key().unwrap_or_else(|code| halt(code));

    let modem_uart = BufferedUart::new(
        p.USART1,
        p.PA10,
        p.PA9,
        MODEM_TX.init([0; 128]),
        MODEM_RX.init([0; 128]),
        Irqs,
        usart::Config::default(),
    )
    .unwrap_or_else(|_| halt(FaultCode::RadioInit));
    let mut modem = Modem::new(modem_uart, Output::new(p.PA8, Level::High, Speed::Low));
    bring_up(&mut modem, &RadioConfig::default()).unwrap_or_else(|code| halt(code));

    let stick = Stick::new(Adc::new(p.ADC1), p.PA0.degrade_adc(), p.PA3.degrade_adc());

    let mut handset = Handset::new(
        modem,
        key,
        stick,
        FaultReporter::new(&ANNUNCIATOR, DiagPort),
        config,
    );
    handset.start(Uptime.now());

    let mut wdg = IndependentWatchdog::new(p.IWDG, WATCHDOG_TIMEOUT_US);
    wdg.unleash();

    let mut ticker = Ticker::every(LOOP_PERIOD);
    let mut last_print = 0;
    loop {
        let now = Uptime.now();
        handset.tick(now);

        if now.wrapping_sub(last_print) >= STATUS_PRINT_PERIOD {
            last_print = now;
            if let Some(cv) = handset.battery_centivolts() {
                info!("handset battery {}.{:02}V", cv / 100, cv % 100);
            }
            match (handset.status(now), handset.recent_fault(now)) {
                (Some(status), fault) => info!(
                    "{}V {}A {}km/h fault {}",
                    status.input_voltage_v(),
                    status.input_current_a(),
                    status.speed_kmh(),
                    fault
                ),
                (None, _) => debug!("no telemetry"),
            }
        }

        wdg.pet();
        ticker.next().await;
    }
}
