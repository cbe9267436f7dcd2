use common::peripherals::ThrottleInput;
use common::session::throttle_from_adc;
use embassy_stm32::adc::{Adc, AnyAdcChannel, Instance, Resolution};

/// Stick pot read against its own supply, so a sagging battery doesn't shift the scale.
///
/// Samples are 10-bit, the unit the throttle and battery calibrations are in.
pub struct Stick<'d, T: Instance> {
    adc: Adc<'d, T>,
    wiper: AnyAdcChannel<T>,
    supply: AnyAdcChannel<T>,
    last_supply: Option<u16>,
}

impl<'d, T: Instance> Stick<'d, T> {
    pub fn new(mut adc: Adc<'d, T>, wiper: AnyAdcChannel<T>, supply: AnyAdcChannel<T>) -> Self {
        adc.set_resolution(Resolution::BITS10);
        Self {
            adc,
            wiper,
            supply,
            last_supply: None,
        }
    }
}

impl<T: Instance> ThrottleInput for Stick<'_, T> {
    fn read(&mut self) -> i8 {
        let position = self.adc.blocking_read(&mut self.wiper);
        let supply = self.adc.blocking_read(&mut self.supply);
        self.last_supply = Some(supply);
        throttle_from_adc(position, supply)
    }

    fn supply(&self) -> Option<u16> {
        self.last_supply
    }
}
