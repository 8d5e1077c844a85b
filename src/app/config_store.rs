//! Persisted device record.
//!
//! One fixed-size record survives reboots: validity marker, last network
//! assignment, device name and the human-readable reason of the last
//! intentional reset.
//!
//! ```text
//! offset  size  field
//!      0     4  marker (u32 LE): 0xCAFEBABE valid, anything else invalid
//!      4     4  address octets
//!      8     4  gateway octets
//!     12     4  mask octets
//!     16    20  name, NUL-padded (≤ 19 bytes)
//!     36    40  reset reason, NUL-padded (≤ 39 bytes)
//! ```

use std::net::Ipv4Addr;

use log::{info, warn};

use super::ports::{NetworkAssignment, StorageError, StoragePort};

pub const CONFIG_NAMESPACE: &str = "node";
pub const CONFIG_KEY: &str = "wifiConfig";

/// Marker of a record written after a successful first-time configuration.
pub const VALID_MARKER: u32 = 0xCAFE_BABE;
/// Marker written to force reconfiguration on the next boot.
pub const INVALID_MARKER: u32 = 0xDEAD_BEEF;

pub const NAME_CAPACITY: usize = 19;
pub const REASON_CAPACITY: usize = 39;
pub const RECORD_LEN: usize = 76;

const NAME_FIELD: core::ops::Range<usize> = 16..36;
const REASON_FIELD: core::ops::Range<usize> = 36..76;

pub type DeviceName = heapless::String<NAME_CAPACITY>;
pub type ResetReason = heapless::String<REASON_CAPACITY>;

/// Cut `s` to at most `N` bytes without splitting a character.
pub fn truncated<const N: usize>(s: &str) -> heapless::String<N> {
    let mut end = s.len().min(N);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = heapless::String::new();
    // Cannot fail: `end <= N` and ends on a boundary.
    let _ = out.push_str(&s[..end]);
    out
}

// ───────────────────────────────────────────────────────────────
// Record
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub marker: u32,
    pub assignment: NetworkAssignment,
    pub name: DeviceName,
    pub reset_reason: ResetReason,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            marker: 0,
            assignment: NetworkAssignment::UNSPECIFIED,
            name: DeviceName::new(),
            reset_reason: ResetReason::new(),
        }
    }
}

impl DeviceConfig {
    pub fn is_valid(&self) -> bool {
        self.marker == VALID_MARKER
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..4].copy_from_slice(&self.marker.to_le_bytes());
        out[4..8].copy_from_slice(&self.assignment.address.octets());
        out[8..12].copy_from_slice(&self.assignment.gateway.octets());
        out[12..16].copy_from_slice(&self.assignment.mask.octets());
        out[NAME_FIELD][..self.name.len()].copy_from_slice(self.name.as_bytes());
        out[REASON_FIELD][..self.reset_reason.len()].copy_from_slice(self.reset_reason.as_bytes());
        out
    }

    /// Decode a stored record.  Returns `None` on a wrong length or text
    /// fields that are not UTF-8.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != RECORD_LEN {
            return None;
        }
        let marker = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let octets = |at: usize| Ipv4Addr::new(bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]);
        Some(Self {
            marker,
            assignment: NetworkAssignment {
                address: octets(4),
                gateway: octets(8),
                mask: octets(12),
            },
            name: truncated(text_field(&bytes[NAME_FIELD])?),
            reset_reason: truncated(text_field(&bytes[REASON_FIELD])?),
        })
    }
}

fn text_field(field: &[u8]) -> Option<&str> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..end]).ok()
}

// ───────────────────────────────────────────────────────────────
// Store
// ───────────────────────────────────────────────────────────────

/// Owner of the in-memory copy of the device record.
#[derive(Debug, Default)]
pub struct ConfigStore {
    record: DeviceConfig,
}

impl ConfigStore {
    /// Read the record.  Absence or corruption yields a fresh, invalid record.
    pub fn load(storage: &impl StoragePort) -> Self {
        let mut buf = [0u8; RECORD_LEN + 1];
        let record = match storage.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => DeviceConfig::decode(&buf[..len]).unwrap_or_else(|| {
                warn!("ConfigStore: stored record corrupted ({} bytes), starting fresh", len);
                DeviceConfig::default()
            }),
            Err(StorageError::NotFound) => {
                info!("ConfigStore: no stored record, starting fresh");
                DeviceConfig::default()
            }
            Err(e) => {
                warn!("ConfigStore: read failed ({}), starting fresh", e);
                DeviceConfig::default()
            }
        };
        if record.is_valid() {
            info!(
                "ConfigStore: valid record name='{}' addr={} last reset='{}'",
                record.name, record.assignment.address, record.reset_reason
            );
        }
        Self { record }
    }

    pub fn save(&self, storage: &mut impl StoragePort) -> Result<(), StorageError> {
        storage.write(CONFIG_NAMESPACE, CONFIG_KEY, &self.record.encode())
    }

    /// Load, replace the reset reason and save, without touching anything else.
    pub fn persist_reset_reason(
        storage: &mut impl StoragePort,
        reason: &str,
    ) -> Result<(), StorageError> {
        let mut store = Self::load(storage);
        store.set_reset_reason(reason);
        store.save(storage)
    }

    pub fn record(&self) -> &DeviceConfig {
        &self.record
    }

    pub fn is_valid(&self) -> bool {
        self.record.is_valid()
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn reset_reason(&self) -> &str {
        &self.record.reset_reason
    }

    /// The assignment to restore, only when the record is valid.
    pub fn assignment(&self) -> Option<NetworkAssignment> {
        self.is_valid().then_some(self.record.assignment)
    }

    pub fn set_name(&mut self, name: &str) {
        self.record.name = truncated(name);
    }

    pub fn set_reset_reason(&mut self, reason: &str) {
        self.record.reset_reason = truncated(reason);
    }

    pub fn set_assignment(&mut self, assignment: NetworkAssignment) {
        self.record.assignment = assignment;
    }

    pub fn mark_valid(&mut self) {
        self.record.marker = VALID_MARKER;
    }

    pub fn mark_invalid(&mut self) {
        self.record.marker = INVALID_MARKER;
    }
}
