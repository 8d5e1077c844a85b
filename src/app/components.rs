//! Capability traits for pluggable sensors and communicators.
//!
//! Sensors implement [`Readable`]; outbound sinks (log, REST, MQTT ...)
//! implement [`Communicator`].  Both report statistics through
//! [`StatisticsProvider`].  The orchestrator holds them as
//! `Box<dyn ...>` in registration order and fans out in that order.

use core::fmt;

use crate::diagnostics::StatisticsProvider;

// ───────────────────────────────────────────────────────────────
// Readings
// ───────────────────────────────────────────────────────────────

/// One measured value.  `NoData` marks a channel that produced nothing this
/// cycle; sinks are free to skip it.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    Int(i64),
    Float(f32),
    Text(String),
    NoData,
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{:.2}", v),
            Self::Text(v) => f.write_str(v),
            Self::NoData => f.write_str("-"),
        }
    }
}

/// Timestamped set of named values produced by one sensor read.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Milliseconds since boot at acquisition.
    pub timestamp_ms: u64,
    pub values: Vec<(String, SensorValue)>,
}

impl SensorReading {
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            values: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, value: SensorValue) -> Self {
        self.values.push((key.to_string(), value));
        self
    }

    /// Values other than [`SensorValue::NoData`].
    pub fn present(&self) -> impl Iterator<Item = &(String, SensorValue)> {
        self.values.iter().filter(|(_, v)| *v != SensorValue::NoData)
    }
}

/// A sensor's error report.  `fatal` during setup halts the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorStatus {
    pub message: String,
    pub fatal: bool,
}

impl SensorStatus {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fatal {
            write!(f, "FATAL {}", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Capabilities
// ───────────────────────────────────────────────────────────────

/// A sensor driver.
pub trait Readable: StatisticsProvider {
    /// One-time initialisation.  A fatal status halts the node.
    fn setup(&mut self) -> Result<(), SensorStatus>;

    /// Take one reading.
    fn read(&mut self, timestamp_ms: u64) -> Result<SensorReading, SensorStatus>;
}

/// Connectivity transition hooks, called only on actual transitions.
pub trait NetworkAware {
    fn network_connected(&mut self) {}

    fn network_disconnected(&mut self) {}
}

/// An outbound sink for readings and status messages.
pub trait Communicator: NetworkAware + StatisticsProvider {
    fn setup(&mut self) {}

    fn new_reading(&mut self, sensor: &str, reading: &SensorReading);

    fn new_status(&mut self, sensor: &str, status: &SensorStatus);

    /// Node-level status such as the boot banner.
    fn new_hardware_status(&mut self, _message: &str) {}

    /// Called once per main-loop tick.
    fn service(&mut self) {}
}
