//! Node configuration parameters
//!
//! All tunable parameters for the sensor node.  Defaults are compiled in;
//! a persisted copy in the key-value store overrides them.

use std::net::Ipv4Addr;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{ConfigError, StoragePort};

const CONFIG_NAMESPACE: &str = "node";
const CONFIG_KEY: &str = "nodecfg";
const MAX_BLOB_SIZE: usize = 1024;

/// Core node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    // --- WiFi ---
    pub ssid: String,
    pub password: String,
    /// DNS servers applied together with a restored static assignment
    pub primary_dns: [u8; 4],
    pub secondary_dns: [u8; 4],

    // --- Provisioning ---
    /// Name lookup URL prefix; the MAC (with `_` separators) is appended
    pub name_service_url: String,
    /// Firmware URL prefix; `<name>.version` / `<name>.bin` are appended
    pub firmware_base_url: String,

    // --- Command channel ---
    pub command_group: [u8; 4],
    pub command_port: u16,

    // --- Acquisition / reconnect ---
    /// Failed polls tolerated before the initial association gives up
    pub acquire_attempts: u32,
    pub acquire_poll_ms: u32,
    /// Reconnect attempts tolerated before a reboot
    pub reconnect_retries: u32,
    /// Backoff unit; attempt `n` waits `n * reconnect_base_delay_ms`
    pub reconnect_base_delay_ms: u32,

    // --- Timing ---
    pub watchdog_timeout_ms: u32,
    pub http_connect_timeout_ms: u32,
    pub http_data_timeout_ms: u32,
    /// Target main-loop period
    pub loop_interval_ms: u32,
    pub ota_chunk_size: usize,

    // --- Diagnostics ---
    /// Error LED GPIO, or -1 for none
    pub err_led_gpio: i32,
    /// 0 = info, 1 = warn, 2 = error
    pub debug_level: u8,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ssid: option_env!("NODE_WIFI_SSID").unwrap_or_default().to_string(),
            password: option_env!("NODE_WIFI_PASSWORD").unwrap_or_default().to_string(),
            primary_dns: [192, 168, 188, 1],
            secondary_dns: [8, 8, 8, 8],

            name_service_url: "http://192.168.188.250/esp/".to_string(),
            firmware_base_url: "http://192.168.188.250/esp/firmware/".to_string(),

            command_group: [239, 1, 23, 42],
            command_port: 2323,

            acquire_attempts: 10,
            acquire_poll_ms: 500,
            reconnect_retries: 6,
            reconnect_base_delay_ms: 1000,

            watchdog_timeout_ms: 15_000,
            http_connect_timeout_ms: 500,
            http_data_timeout_ms: 1000,
            loop_interval_ms: 1000,
            ota_chunk_size: 1024,

            err_led_gpio: -1,
            debug_level: 0,
        }
    }
}

impl NodeConfig {
    pub fn command_group(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.command_group)
    }

    pub fn primary_dns(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.primary_dns)
    }

    pub fn secondary_dns(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.secondary_dns)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match self.debug_level {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Warn,
            _ => log::LevelFilter::Error,
        }
    }

    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_ssid(&self.ssid)?;
        validate_password(&self.password)?;
        if !self.command_group().is_multicast() {
            return Err(ConfigError::ValidationFailed(
                "command_group must be a multicast address",
            ));
        }
        if self.command_port == 0 {
            return Err(ConfigError::ValidationFailed("command_port must be non-zero"));
        }
        if !self.name_service_url.starts_with("http://") {
            return Err(ConfigError::ValidationFailed(
                "name_service_url must be a plain http:// URL",
            ));
        }
        if !self.firmware_base_url.starts_with("http://") {
            return Err(ConfigError::ValidationFailed(
                "firmware_base_url must be a plain http:// URL",
            ));
        }
        if !(1..=100).contains(&self.acquire_attempts) {
            return Err(ConfigError::ValidationFailed("acquire_attempts must be 1–100"));
        }
        if !(50..=10_000).contains(&self.acquire_poll_ms) {
            return Err(ConfigError::ValidationFailed("acquire_poll_ms must be 50–10000"));
        }
        if !(1..=20).contains(&self.reconnect_retries) {
            return Err(ConfigError::ValidationFailed("reconnect_retries must be 1–20"));
        }
        if !(100..=10_000).contains(&self.reconnect_base_delay_ms) {
            return Err(ConfigError::ValidationFailed(
                "reconnect_base_delay_ms must be 100–10000",
            ));
        }
        if !(100..=10_000).contains(&self.loop_interval_ms) {
            return Err(ConfigError::ValidationFailed("loop_interval_ms must be 100–10000"));
        }
        if !(1000..=120_000).contains(&self.watchdog_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "watchdog_timeout_ms must be 1000–120000",
            ));
        }
        // The slowest single step of the loop must fit inside one watchdog period.
        let longest_backoff = self.reconnect_retries * self.reconnect_base_delay_ms;
        if longest_backoff >= self.watchdog_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "reconnect backoff must stay below watchdog_timeout_ms",
            ));
        }
        if self.http_connect_timeout_ms + self.http_data_timeout_ms >= self.watchdog_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "http timeouts must stay below watchdog_timeout_ms",
            ));
        }
        if !(256..=16_384).contains(&self.ota_chunk_size) {
            return Err(ConfigError::ValidationFailed("ota_chunk_size must be 256–16384"));
        }
        if self.debug_level > 2 {
            return Err(ConfigError::ValidationFailed("debug_level must be 0–2"));
        }
        Ok(())
    }

    /// Load the persisted config, falling back to defaults on absence,
    /// corruption, or a stored copy that no longer validates.
    pub fn load_or_default(storage: &impl StoragePort) -> Self {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let len = match storage.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => len,
            Err(_) => {
                info!("NodeConfig: no stored config, using defaults");
                return Self::default();
            }
        };
        match postcard::from_bytes::<Self>(&buf[..len]) {
            Ok(cfg) if cfg.validate().is_ok() => {
                info!("NodeConfig: loaded stored config ({} bytes)", len);
                cfg
            }
            Ok(_) => {
                warn!("NodeConfig: stored config failed validation, using defaults");
                Self::default()
            }
            Err(_) => {
                warn!("NodeConfig: stored config corrupted, using defaults");
                Self::default()
            }
        }
    }

    /// Validate and persist.
    pub fn save(&self, storage: &mut impl StoragePort) -> Result<(), ConfigError> {
        self.validate()?;
        let bytes = postcard::to_allocvec(self).map_err(|_| ConfigError::IoError)?;
        storage
            .write(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)
            .map_err(|_| ConfigError::IoError)?;
        info!("NodeConfig: saved ({} bytes)", bytes.len());
        Ok(())
    }

    /// Active configuration as JSON with the WiFi password redacted.
    pub fn to_json(&self) -> String {
        let mut shown = self.clone();
        if !shown.password.is_empty() {
            shown.password = "***".to_string();
        }
        serde_json::to_string(&shown).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Active config for this boot.
    ///
    /// A build-time JSON override (`SENSORNODE_CONFIG`) that validates is
    /// written to flash when it differs from the stored copy and wins. An
    /// override that does not parse or validate is ignored with a warning.
    pub fn provision(storage: &mut impl StoragePort, overrides: Option<&str>) -> Self {
        let stored = Self::load_or_default(storage);
        let Some(json) = overrides else {
            return stored;
        };
        match Self::from_json(json) {
            Ok(cfg) if cfg == stored => cfg,
            Ok(cfg) => {
                if let Err(e) = cfg.save(storage) {
                    warn!("NodeConfig: build-time config not persisted: {}", e);
                }
                cfg
            }
            Err(e) => {
                warn!("NodeConfig: build-time config rejected: {}", e);
                stored
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Credential validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// Empty is accepted (no credentials baked in); otherwise 1-32 printable bytes.
fn validate_ssid(ssid: &str) -> Result<(), ConfigError> {
    if ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConfigError::ValidationFailed(
            "ssid must be at most 32 printable ASCII bytes",
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConfigError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConfigError::ValidationFailed(
            "password must be 8-64 bytes for WPA2, or empty for open",
        ));
    }
    Ok(())
}
