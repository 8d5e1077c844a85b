//! Unified error type for the sensor-node firmware.
//!
//! Each port reports its own typed error; the lifecycle code funnels them
//! into [`Error`] so `boot()` and `tick()` can propagate with `?`.
//! Two variants are terminal: [`Error::Restarted`] means a reboot was
//! requested (on hardware the call never returns), [`Error::Halted`] means
//! the node entered its fatal error state.

use core::fmt;

use crate::app::ports::{ChannelError, ConfigError, HttpError, NetworkError, StorageError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The key-value store rejected a read or write.
    Storage(StorageError),
    /// The WiFi station could not be configured or started.
    Network(NetworkError),
    /// An HTTP exchange failed.
    Http(HttpError),
    /// The command channel could not be opened.
    Channel(ChannelError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// A restart was requested after persisting a reset reason.
    Restarted,
    /// A sensor failed fatally during setup; the node is halted.
    Halted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Network(e) => write!(f, "network: {e}"),
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Channel(e) => write!(f, "command channel: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Restarted => write!(f, "restart requested"),
            Self::Halted => write!(f, "node halted"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Self::Http(e)
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
