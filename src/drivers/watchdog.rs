//! Task Watchdog Timer (TWDT) driver.
//!
//! Wraps the ESP-IDF TWDT API to reset the device if the main task stalls
//! for longer than the configured timeout.  Every blocking operation feeds
//! it through [`WatchdogPort::feed`].

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use log::info;

use crate::app::ports::WatchdogPort;

pub struct Watchdog {
    subscribed: bool,
    timeout_ms: u32,
    feeds: u64,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Unarmed watchdog.  Call [`WatchdogPort::arm`] to subscribe the
    /// current task.
    pub fn new() -> Self {
        Self {
            subscribed: false,
            timeout_ms: 0,
            feeds: 0,
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn is_armed(&self) -> bool {
        self.subscribed
    }

    pub fn feeds(&self) -> u64 {
        self.feeds
    }
}

impl WatchdogPort for Watchdog {
    #[cfg(target_os = "espidf")]
    fn arm(&mut self, timeout_ms: u32) {
        unsafe {
            let cfg = esp_task_wdt_config_t {
                timeout_ms,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            let ret = esp_task_wdt_reconfigure(&cfg);
            if ret != ESP_OK {
                log::warn!(
                    "Watchdog: reconfigure returned {} (may already be configured)",
                    ret
                );
            }

            if !self.subscribed {
                let ret = esp_task_wdt_add(core::ptr::null_mut());
                self.subscribed = ret == ESP_OK;
                if !self.subscribed {
                    log::warn!("Watchdog: failed to subscribe ({})", ret);
                }
            }
        }
        self.timeout_ms = timeout_ms;
        info!("Watchdog: armed ({} ms timeout, panic on trigger)", timeout_ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn arm(&mut self, timeout_ms: u32) {
        self.subscribed = true;
        self.timeout_ms = timeout_ms;
        info!("Watchdog(sim): armed ({} ms)", timeout_ms);
    }

    fn feed(&mut self) {
        if !self.subscribed {
            return;
        }
        #[cfg(target_os = "espidf")]
        unsafe {
            esp_task_wdt_reset();
        }
        self.feeds += 1;
    }

    #[cfg(target_os = "espidf")]
    fn fired_last_boot(&self) -> bool {
        let reason = unsafe { esp_reset_reason() };
        matches!(
            reason,
            esp_reset_reason_t_ESP_RST_TASK_WDT
                | esp_reset_reason_t_ESP_RST_INT_WDT
                | esp_reset_reason_t_ESP_RST_WDT
        )
    }

    #[cfg(not(target_os = "espidf"))]
    fn fired_last_boot(&self) -> bool {
        false
    }
}
