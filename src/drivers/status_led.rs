//! Error-indicator LED driver.
//!
//! One GPIO, active high.  A blink period is 500 ms off then 500 ms on, so
//! a halted node shows a steady 1 Hz flash.
//!
//! ## Dual-target design
//!
//! Generic over [`OutputPin`]: on ESP-IDF a `PinDriver` output, on host a
//! test pin.  Delays come from the caller's [`DelayNs`].

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

const HALF_PERIOD_MS: u32 = 500;

pub struct StatusLed<P: OutputPin> {
    pin: P,
    lit: bool,
    blinks: u32,
}

impl<P: OutputPin> StatusLed<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            lit: false,
            blinks: 0,
        }
    }

    pub fn set(&mut self, on: bool) {
        // Pin errors are not actionable from the halt loop.
        let _ = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        self.lit = on;
    }

    /// One error-indication period.
    pub fn blink(&mut self, delay: &mut impl DelayNs) {
        self.set(false);
        delay.delay_ms(HALF_PERIOD_MS);
        self.set(true);
        delay.delay_ms(HALF_PERIOD_MS);
        self.blinks = self.blinks.wrapping_add(1);
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn blinks(&self) -> u32 {
        self.blinks
    }
}
