#![no_std]
#![no_main]

use common::config::{RadioConfig, VehicleConfig};
use common::fault::FaultCode;
use common::peripherals::{Actuator, Clock};
use common::session::{FaultReporter, Vehicle, bring_up};
use defmt::*;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::gpio::{Level, Output, OutputType, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::usart::{self, BufferedUart, UartTx};
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_time::{Duration, Ticker};
use rclink_firmware::board::{self, Uptime};
use rclink_firmware::diag::{DiagPort, diag_task};
use rclink_firmware::esc::{Vesc, esc_task};
use rclink_firmware::modem::Modem;
use rclink_firmware::servo::EscSignal;
use rclink_firmware::status_led::{ANNUNCIATOR, status_led_task};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    USART1 => usart::BufferedInterruptHandler<peripherals::USART1>;
    USART2 => usart::BufferedInterruptHandler<peripherals::USART2>;
});

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn UART4() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

const LOOP_PERIOD: Duration = Duration::from_millis(1);
const WATCHDOG_TIMEOUT_US: u32 = 50_000;

static MODEM_TX: StaticCell<[u8; 128]> = StaticCell::new();
static MODEM_RX: StaticCell<[u8; 128]> = StaticCell::new();
static VESC_TX: StaticCell<[u8; 32]> = StaticCell::new();
static VESC_RX: StaticCell<[u8; 128]> = StaticCell::new();

fn halt(code: FaultCode) -> ! {
    ANNUNCIATOR.halt(code, &Uptime, &mut DiagPort)
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_stm32::init(board::config());
    info!("vehicle starting");

    // Status LED and diagnostics first, so bring-up failures can be announced
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

    let config = VehicleConfig::default();
    let key = rclink_firmware::cipher_key().unwrap_or_else(|code| halt(code));

    // Output parked at neutral before anything else can move it
    let pwm = SimplePwm::new(
        p.TIM3,
        Some(PwmPin::new(p.PA6, OutputType::PushPull)),
        None,
        None,
        None,
        Hertz(50),
        CountingMode::EdgeAlignedUp,
    );
    let mut esc_signal = EscSignal::new(pwm);
    esc_signal.set_pulse_width_us(config.pulse.neutral_us);

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

    let mut vesc_config = usart::Config::default();
    vesc_config.baudrate = 115_200;
    let vesc_uart = BufferedUart::new(
        p.USART2,
        p.PD6,
        p.PD5,
        VESC_TX.init([0; 32]),
        VESC_RX.init([0; 128]),
        Irqs,
        vesc_config,
    )
    .unwrap_or_else(|_| halt(FaultCode::TelemetryRead));
    spawner.spawn(unwrap!(esc_task(vesc_uart)));

    let mut vehicle = Vehicle::new(
        modem,
        key,
        esc_signal,
        Vesc,
        FaultReporter::new(&ANNUNCIATOR, DiagPort),
        config,
    );
    vehicle.start(Uptime.now());

    let mut wdg = IndependentWatchdog::new(p.IWDG, WATCHDOG_TIMEOUT_US);
    wdg.unleash();

    let mut ticker = Ticker::every(LOOP_PERIOD);
    loop {
        vehicle.tick(Uptime.now());
        wdg.pet();
        ticker.next().await;
    }
}
