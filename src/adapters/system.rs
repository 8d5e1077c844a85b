//! System adapter: monotonic clock, blocking delays, software reset,
//! reset-cause names and the fatal-error indication.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()`, FreeRTOS delays,
//!   `esp_restart()` and the ROM reset-reason register of each core.
//! - **`not(target_os = "espidf")`**: `std::time::Instant` and thread
//!   sleeps; restarts are recorded instead of performed.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::warn;

use crate::app::ports::SystemPort;
use crate::drivers::status_led::StatusLed;

/// Name of a ROM reset-reason code, as printed by the bootloader.
pub fn reset_cause_name(code: u32) -> &'static str {
    match code {
        0 => "NO_MEAN",
        1 => "POWERON_RESET",
        3 => "SW_RESET",
        4 => "OWDT_RESET",
        5 => "DEEPSLEEP_RESET",
        6 => "SDIO_RESET",
        7 => "TG0WDT_SYS_RESET",
        8 => "TG1WDT_SYS_RESET",
        9 => "RTCWDT_SYS_RESET",
        10 => "INTRUSION_RESET",
        11 => "TGWDT_CPU_RESET",
        12 => "SW_CPU_RESET",
        13 => "RTCWDT_CPU_RESET",
        14 => "EXT_CPU_RESET",
        15 => "RTCWDT_BROWN_OUT_RESET",
        16 => "RTCWDT_RTC_RESET",
        _ => "UNKNOWN",
    }
}

/// Blocking delay provider for the running platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct Delay;

impl DelayNs for Delay {
    #[cfg(target_os = "espidf")]
    fn delay_ns(&mut self, ns: u32) {
        esp_idf_svc::hal::delay::Ets::delay_us(ns.div_ceil(1000));
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_svc::hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

/// Pause used as the error indication when no LED is fitted.
const NO_LED_PAUSE_MS: u32 = 1000;

pub struct SystemAdapter<P: OutputPin> {
    led: Option<StatusLed<P>>,
    delay: Delay,
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    restarts: u32,
}

impl<P: OutputPin> SystemAdapter<P> {
    pub fn new(led: Option<StatusLed<P>>) -> Self {
        Self {
            led,
            delay: Delay,
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            restarts: 0,
        }
    }

    /// Simulation: number of restarts requested so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn restart_requests(&self) -> u32 {
        self.restarts
    }
}

impl<P: OutputPin> SystemPort for SystemAdapter<P> {
    #[cfg(target_os = "espidf")]
    fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
    }

    #[cfg(not(target_os = "espidf"))]
    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        warn!("System: restarting");
        esp_idf_svc::hal::reset::restart();
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        self.restarts += 1;
        warn!("System(sim): restart requested ({})", self.restarts);
    }

    #[cfg(target_os = "espidf")]
    fn reset_causes(&self) -> [&'static str; 2] {
        let cause = |core: i32| reset_cause_name(unsafe {
            esp_idf_svc::sys::esp_rom_get_reset_reason(core)
        } as u32);
        [cause(0), cause(1)]
    }

    #[cfg(not(target_os = "espidf"))]
    fn reset_causes(&self) -> [&'static str; 2] {
        [reset_cause_name(1), reset_cause_name(14)]
    }

    fn error_blink(&mut self) {
        match self.led.as_mut() {
            Some(led) => led.blink(&mut self.delay),
            None => self.delay.delay_ms(NO_LED_PAUSE_MS),
        }
    }
}
