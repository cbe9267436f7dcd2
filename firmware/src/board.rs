use common::Tick;
use common::peripherals::Clock;
use embassy_stm32::Config;
use embassy_stm32::time::Hertz;
use embassy_time::Instant;

// NUCLEO-H7S3L8, both ends run the same board
//
//   radio modem   USART1  PA9 tx, PA10 rx, PA8 SET
//   VESC          USART2  PD5 tx, PD6 rx          (vehicle)
//   ESC signal    TIM3    PA6 ch1                 (vehicle)
//   stick         ADC1    PA0 wiper, PA3 supply   (handset)
//   diagnostics   USART3  PB10 tx (ST-Link VCOM)
//   status LED    PD10

pub fn config() -> Config {
    let mut config = Config::default();
    // The board's 24 MHz HSE crystal: 24 / 3 * 150 / 2 = 600 MHz, the H7S3 ceiling at
    // VoltageScale::HIGH. Every APB sits at 150 MHz, which the radio modem, VESC and
    // diagnostic USART baud dividers and the TIM3 ESC frame are derived from.
    {
        use embassy_stm32::rcc::*;
        config.rcc.hse = Some(Hse {
            freq: Hertz(24_000_000),
            mode: HseMode::Oscillator,
        });
        config.rcc.pll1 = Some(Pll {
            source: PllSource::HSE,
            prediv: PllPreDiv::DIV3,
            mul: PllMul::MUL150,
            divp: Some(PllDiv::DIV2),
            divq: None,
            divr: None,
            divs: None,
            divt: None,
        });
        config.rcc.sys = Sysclk::PLL1_P; // 600 MHz
        config.rcc.ahb_pre = AHBPrescaler::DIV2; // 300 MHz
        config.rcc.apb1_pre = APBPrescaler::DIV2; // 150 MHz
        config.rcc.apb2_pre = APBPrescaler::DIV2; // 150 MHz
        config.rcc.apb4_pre = APBPrescaler::DIV2; // 150 MHz
        config.rcc.apb5_pre = APBPrescaler::DIV2; // 150 MHz
        config.rcc.voltage_scale = VoltageScale::HIGH;
    }
    config
}

/// Milliseconds since boot, wrapping after ~49 days.
pub struct Uptime;

impl Clock for Uptime {
    fn now(&self) -> Tick {
        Instant::now().as_millis() as Tick
    }
}
