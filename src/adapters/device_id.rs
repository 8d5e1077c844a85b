//! Device identity derived from the ESP32 factory MAC address.
//!
//! - `mac_string`: `24:0A:C4:00:11:22`, reported by `INFO`
//! - `mac_path`: `24_0A_C4_00_11_22`, the name-service lookup key
//! - `default_name`: `node-xxyyzz`, used until the name service assigns one

use core::fmt::Write;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

fn joined(mac: &MacAddress, sep: char) -> String {
    let mut out = String::with_capacity(17);
    for (i, b) in mac.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Uppercase, colon-separated.
pub fn mac_string(mac: &MacAddress) -> String {
    joined(mac, ':')
}

/// Uppercase, underscore-separated, safe as a URL path segment.
pub fn mac_path(mac: &MacAddress) -> String {
    joined(mac, '_')
}

/// Default node name from the last 3 MAC bytes.
/// Format: `node-xxyyzz` (lowercase, fits the persisted name field).
pub fn default_name(mac: &MacAddress) -> String {
    format!("node-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5])
}
