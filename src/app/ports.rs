//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ NodeService (domain)
//! ```
//!
//! Driven adapters (WiFi station, HTTP client, OTA flash, multicast socket,
//! key-value store, system clock, watchdog) implement these traits.  The
//! [`NodeService`](super::service::NodeService) and its components consume
//! them through a single `hw` context passed at each call site, so the
//! domain core never touches hardware directly and tests can script every
//! external effect.
//!
//! Method names are unique across all ports so that a type implementing
//! every port (see [`Platform`]) never produces ambiguous calls.

use core::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use crate::events::LinkEvent;

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for the device record and node config.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic, with no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; in-memory simulation
///   achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Network port (driven adapter: domain → WiFi station)
// ───────────────────────────────────────────────────────────────

/// Static address assignment restored from the device record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkAssignment {
    pub address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl NetworkAssignment {
    pub const UNSPECIFIED: Self = Self {
        address: Ipv4Addr::UNSPECIFIED,
        gateway: Ipv4Addr::UNSPECIFIED,
        mask: Ipv4Addr::UNSPECIFIED,
    };
}

/// WiFi station control.  Association is asynchronous: `begin` starts it
/// and the caller polls [`is_connected`](NetworkPort::is_connected).
pub trait NetworkPort {
    /// Set the hostname, apply `assignment` (or DHCP when `None`) and start
    /// associating with the configured access point.
    fn begin(&mut self, hostname: &str, assignment: Option<&NetworkAssignment>)
    -> Result<(), NetworkError>;

    /// `true` once the station is associated and has an address.
    fn is_connected(&self) -> bool;

    /// Disconnect, power-cycle the radio into station mode and re-begin.
    fn restart_radio(&mut self) -> Result<(), NetworkError>;

    /// The address assignment currently held by the station, if any.
    fn assignment(&self) -> Option<NetworkAssignment>;

    /// Station MAC address.
    fn mac_address(&self) -> [u8; 6];

    /// Next link event queued by the network-stack callbacks.
    fn poll_link_event(&mut self) -> Option<LinkEvent>;
}

// ───────────────────────────────────────────────────────────────
// HTTP port (driven adapter: domain → HTTP client)
// ───────────────────────────────────────────────────────────────

/// A small, fully buffered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Headers of a streamed response opened with [`HttpPort::open_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHead {
    pub status: u16,
    pub content_length: Option<usize>,
}

/// Plain-HTTP GET client with short, configuration-controlled timeouts.
///
/// At most one stream is open at a time.
pub trait HttpPort {
    /// GET `url` and buffer at most `max_body` bytes of the body.
    fn get(&mut self, url: &str, max_body: usize) -> Result<HttpResponse, HttpError>;

    /// GET `url` and return the status line and length; the body is then
    /// pulled with [`read_stream`](HttpPort::read_stream).
    fn open_stream(&mut self, url: &str) -> Result<StreamHead, HttpError>;

    /// Read the next body bytes of the open stream.  `Ok(0)` means end of body.
    fn read_stream(&mut self, buf: &mut [u8]) -> Result<usize, HttpError>;

    /// Release the open stream, if any.
    fn close_stream(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Flash port (driven adapter: domain → OTA partition)
// ───────────────────────────────────────────────────────────────

/// Inactive-slot firmware writer.
pub trait FlashPort {
    /// Open the inactive slot for an image of `size` bytes.
    fn begin_update(&mut self, size: usize) -> Result<(), FlashError>;

    /// Append image bytes.
    fn write_update(&mut self, data: &[u8]) -> Result<(), FlashError>;

    /// Verify the image and mark the slot bootable.
    fn finalize_update(&mut self) -> Result<(), FlashError>;

    /// Discard a partially written image.
    fn abort_update(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Command channel port (driven adapter: domain ↔ UDP multicast)
// ───────────────────────────────────────────────────────────────

pub trait CommandChannelPort {
    /// Join `group` and receive on `port`.
    fn listen(&mut self, group: Ipv4Addr, port: u16) -> Result<(), ChannelError>;

    /// Non-blocking receive.  Returns the datagram length and its sender.
    fn receive(&mut self, buf: &mut [u8]) -> Option<(usize, SocketAddr)>;

    /// Unicast `message` back to `peer`.
    fn reply(&mut self, peer: SocketAddr, message: &str);

    /// Send `message` to the joined group.
    fn broadcast(&mut self, message: &str);
}

// ───────────────────────────────────────────────────────────────
// System port (driven adapter: domain → clock, reset, error LED)
// ───────────────────────────────────────────────────────────────

pub trait SystemPort {
    /// Milliseconds since boot (monotonic).
    fn uptime_ms(&self) -> u64;

    /// Block the calling task.
    fn delay_ms(&mut self, ms: u32);

    /// Software reset.  Never returns on hardware; simulations record the
    /// request and return so the caller can unwind with `Error::Restarted`.
    fn restart(&mut self);

    /// Named reset causes of the two cores, e.g. `["POWERON_RESET", "EXT_CPU_RESET"]`.
    fn reset_causes(&self) -> [&'static str; 2];

    /// One period of the fatal-error indication.
    fn error_blink(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Watchdog port
// ───────────────────────────────────────────────────────────────

pub trait WatchdogPort {
    /// Arm (or re-arm) with the given timeout; a missed feed reboots the device.
    fn arm(&mut self, timeout_ms: u32);

    /// Reset the countdown.
    fn feed(&mut self);

    /// Whether the previous boot ended in a watchdog reset.
    fn fired_last_boot(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Platform: every port behind one `hw` reference
// ───────────────────────────────────────────────────────────────

/// The full hardware context.  Blanket-implemented for any type that
/// implements every port, so adapters and mocks only implement the parts.
pub trait Platform:
    StoragePort + NetworkPort + HttpPort + FlashPort + CommandChannelPort + SystemPort + WatchdogPort
{
}

impl<T> Platform for T where
    T: StoragePort
        + NetworkPort
        + HttpPort
        + FlashPort
        + CommandChannelPort
        + SystemPort
        + WatchdogPort
{
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from configuration loading and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`NetworkPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    NoCredentials,
    InvalidAssignment,
    DriverFailed(i32),
}

/// Errors from [`HttpPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    Connect,
    Timeout,
    Read,
    NoStream,
}

/// Errors from [`FlashPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashError {
    /// The inactive slot is smaller than the image.
    NoSpace,
    BeginFailed,
    WriteFailed,
    /// Image verification or boot-slot switch failed; carries the platform code.
    FinalizeFailed(i32),
    NotStarted,
}

/// Errors from [`CommandChannelPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    Bind,
    Join,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidAssignment => write!(f, "invalid static address assignment"),
            Self::DriverFailed(code) => write!(f, "WiFi driver error {}", code),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connection failed"),
            Self::Timeout => write!(f, "timed out"),
            Self::Read => write!(f, "body read failed"),
            Self::NoStream => write!(f, "no open stream"),
        }
    }
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpace => write!(f, "not enough space"),
            Self::BeginFailed => write!(f, "begin failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::FinalizeFailed(code) => write!(f, "finalize failed: {}", code),
            Self::NotStarted => write!(f, "no update in progress"),
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind => write!(f, "socket bind failed"),
            Self::Join => write!(f, "multicast join failed"),
        }
    }
}
