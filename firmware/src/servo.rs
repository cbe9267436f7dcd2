use common::peripherals::Actuator;
use embassy_stm32::timer::GeneralInstance4Channel;
use embassy_stm32::timer::simple_pwm::SimplePwm;

/// Standard RC pulse frame.
pub const FRAME_US: u32 = 20_000;

/// ESC signal on channel 1 of a 50 Hz PWM timer.
pub struct EscSignal<'d, T: GeneralInstance4Channel> {
    pwm: SimplePwm<'d, T>,
}

impl<'d, T: GeneralInstance4Channel> EscSignal<'d, T> {
    pub fn new(mut pwm: SimplePwm<'d, T>) -> Self {
        pwm.ch1().enable();
        Self { pwm }
    }
}

impl<T: GeneralInstance4Channel> Actuator for EscSignal<'_, T> {
    fn set_pulse_width_us(&mut self, us: u16) {
        let mut ch = self.pwm.ch1();
        let max = ch.max_duty_cycle() as u32;
        let duty = (us as u32 * max / FRAME_US).min(max);
        ch.set_duty_cycle(duty as u16);
    }
}
