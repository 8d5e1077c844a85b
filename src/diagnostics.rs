//! Statistics reporting and runtime diagnostics.
//!
//! Every component contributes a flat list of `(key, value)` pairs through
//! [`StatisticsProvider`].  The `INFO` command renders them one per line as
//! `<component>.<key>:<value>`.
//!
//! Runtime metrics (heap) are collected on demand, and a custom panic hook
//! records the panic message as the next boot's reset reason.

use core::fmt::Write;
use std::sync::Mutex;

use crate::app::config_store::ConfigStore;
use crate::app::ports::StoragePort;

/// Flattened `(key, value)` statistics of one component.
pub type Statistics = Vec<(String, String)>;

/// Anything that reports statistics under a component name.
pub trait StatisticsProvider {
    /// Component name used as the key prefix.
    fn name(&self) -> &str;

    fn statistics(&self) -> Statistics {
        Vec::new()
    }
}

/// Helper for building a [`Statistics`] list with `Display` values.
#[derive(Default)]
pub struct StatsBuilder {
    entries: Statistics,
}

impl StatsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, key: &str, value: impl core::fmt::Display) -> Self {
        self.entries.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> Statistics {
        self.entries
    }
}

/// Append `component`'s statistics to `out`, one `<component>.<key>:<value>` per line.
pub fn render_statistics(out: &mut String, component: &str, stats: &Statistics) {
    for (key, value) in stats {
        let _ = writeln!(out, "{}.{}:{}", component, key, value);
    }
}

// ───────────────────────────────────────────────────────────────
// Moving average
// ───────────────────────────────────────────────────────────────

/// Exponential moving average weighting the history 9:1 against each sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ema {
    value: f32,
}

impl Ema {
    pub fn new() -> Self {
        Self::default()
    }

    /// `value = (value * 9 + sample) / 10`
    pub fn update(&mut self, sample: f32) -> f32 {
        self.value = (self.value * 9.0 + sample) / 10.0;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

// ───────────────────────────────────────────────────────────────
// Runtime metrics
// ───────────────────────────────────────────────────────────────

/// Runtime diagnostics snapshot collected on-demand.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeMetrics {
    pub heap_free: u32,
    pub heap_min_free: u32,
}

impl RuntimeMetrics {
    #[cfg(target_os = "espidf")]
    pub fn collect() -> Self {
        use esp_idf_svc::sys::*;
        let heap_free = unsafe { esp_get_free_heap_size() };
        let heap_min_free = unsafe { esp_get_minimum_free_heap_size() };
        Self {
            heap_free,
            heap_min_free,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn collect() -> Self {
        Self {
            heap_free: 200 * 1024,
            heap_min_free: 180 * 1024,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Custom panic handler: records the panic as the reset reason
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that persists `"Panic: <msg>"` as the reset reason
/// through `storage`.
///
/// Must be called once during init, after NVS is ready.
pub fn install_panic_handler<S: StoragePort + Send + 'static>(storage: S) {
    let storage = Mutex::new(storage);
    std::panic::set_hook(Box::new(move |info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        log::error!("PANIC: {}", reason);

        let text = format!("Panic: {}", reason);
        match storage.lock() {
            Ok(mut storage) => {
                if ConfigStore::persist_reset_reason(&mut *storage, &text).is_err() {
                    log::error!("Panic handler: reset reason not persisted");
                }
            }
            Err(_) => log::error!("Panic handler: storage poisoned, reset reason not persisted"),
        }
    }));
}
