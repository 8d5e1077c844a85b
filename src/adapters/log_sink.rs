//! Log-based communicator.
//!
//! Implements [`Communicator`] by writing every reading, sensor status and
//! hardware status to the ESP-IDF logger (UART / USB-CDC in production).
//! A REST or MQTT sink would implement the same trait.

use core::fmt::Write;

use log::{info, warn};

use crate::app::components::{Communicator, NetworkAware, SensorReading, SensorStatus};
use crate::diagnostics::{Statistics, StatisticsProvider, StatsBuilder};

/// Communicator that logs everything to the serial console.
#[derive(Default)]
pub struct LogCommunicator {
    readings: u32,
    statuses: u32,
    online: bool,
}

impl LogCommunicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readings(&self) -> u32 {
        self.readings
    }

    pub fn statuses(&self) -> u32 {
        self.statuses
    }

    pub fn is_online(&self) -> bool {
        self.online
    }
}

/// `sensor | t=21.50 h=40` style line; `NoData` values are skipped.
pub fn format_reading(sensor: &str, reading: &SensorReading) -> String {
    let mut line = format!("{} @{}ms |", sensor, reading.timestamp_ms);
    for (key, value) in reading.present() {
        let _ = write!(line, " {}={}", key, value);
    }
    line
}

impl NetworkAware for LogCommunicator {
    fn network_connected(&mut self) {
        self.online = true;
        info!("LOG | network up");
    }

    fn network_disconnected(&mut self) {
        self.online = false;
        info!("LOG | network down");
    }
}

impl StatisticsProvider for LogCommunicator {
    fn name(&self) -> &str {
        "Log"
    }

    fn statistics(&self) -> Statistics {
        StatsBuilder::new()
            .add("readingsLogged", self.readings)
            .add("statusesLogged", self.statuses)
            .build()
    }
}

impl Communicator for LogCommunicator {
    fn new_reading(&mut self, sensor: &str, reading: &SensorReading) {
        self.readings += 1;
        info!("READ | {}", format_reading(sensor, reading));
    }

    fn new_status(&mut self, sensor: &str, status: &SensorStatus) {
        self.statuses += 1;
        warn!("STATUS | {} | {}", sensor, status);
    }

    fn new_hardware_status(&mut self, message: &str) {
        info!("HW | {}", message);
    }
}
