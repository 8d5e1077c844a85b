//! WiFi acquisition, supervision and reset-with-reason.
//!
//! ```text
//!               acquire()                 link lost
//! Disconnected ──────────▶ Connecting ──▶ Connected ──────────▶ Degraded
//!                              │              ▲                    │
//!                              │ > ceiling    └─── reconnected ────┤
//!                              ▼                                   │ > retries
//!                           restart ◀──────────────────────────────┘
//! ```
//!
//! Every restart initiated here first persists a reason string, so the next
//! boot can report why it happened.  Listeners are notified in registration
//! order, and only on actual transitions.

use log::{debug, error, info, warn};

use crate::adapters::device_id;
use crate::config::NodeConfig;
use crate::diagnostics::{Ema, Statistics, StatsBuilder};
use crate::error::{Error, Result};
use crate::events::UpdateFlag;

use super::components::Communicator;
use super::config_store::ConfigStore;
use super::ota::{OtaUpdater, UpdateOutcome};
use super::ports::{HttpPort, NetworkPort, Platform, StoragePort, SystemPort};

/// Largest name-service body we bother reading.
const NAME_BODY_LIMIT: usize = 128;
/// Pause between persisting a reason and restarting, so logs flush.
const RESTART_GRACE_MS: u32 = 100;

pub const REASON_FRESH: &str = "Fresh-reset";
pub const REASON_WATCHDOG: &str = "Watchdog triggered";
pub const REASON_RETRIES: &str = "Retry count for Wifi exceeded";
pub const REASON_FIRMWARE: &str = "Firmware updated";

/// Delay before reconnect attempt `retry` (1-based): linear in the attempt.
pub fn backoff_delay(retry: u32, base_ms: u32) -> u32 {
    retry.saturating_mul(base_ms)
}

/// Acquisition and reconnect tuning, taken from [`NodeConfig`].
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    pub acquire_attempts: u32,
    pub acquire_poll_ms: u32,
    pub reconnect_retries: u32,
    pub reconnect_base_delay_ms: u32,
    pub name_service_url: String,
}

impl From<&NodeConfig> for ConnectSettings {
    fn from(c: &NodeConfig) -> Self {
        Self {
            acquire_attempts: c.acquire_attempts,
            acquire_poll_ms: c.acquire_poll_ms,
            reconnect_retries: c.reconnect_retries,
            reconnect_base_delay_ms: c.reconnect_base_delay_ms,
            name_service_url: c.name_service_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
}

pub struct ConnectivityManager {
    settings: ConnectSettings,
    store: ConfigStore,
    state: ConnectivityState,
    update_flag: UpdateFlag,
    connect_count: u32,
    retry_count: u32,
    reconnects: u32,
    link_events: u32,
    initial_connect_ms: u64,
    average_connect_ms: Ema,
}

impl ConnectivityManager {
    pub fn new(settings: ConnectSettings, store: ConfigStore, update_flag: UpdateFlag) -> Self {
        Self {
            settings,
            store,
            state: ConnectivityState::Disconnected,
            update_flag,
            connect_count: 0,
            retry_count: 0,
            reconnects: 0,
            link_events: 0,
            initial_connect_ms: 0,
            average_connect_ms: Ema::new(),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Associate for the first time this boot.
    ///
    /// A valid record restores hostname and static assignment.  Otherwise
    /// the station comes up on DHCP and, once connected, the node looks up
    /// its name and persists a valid record.
    pub fn acquire(
        &mut self,
        hw: &mut impl Platform,
        default_name: &str,
        listeners: &mut [Box<dyn Communicator>],
    ) -> Result<()> {
        let started = hw.uptime_ms();
        self.state = ConnectivityState::Connecting;

        let assignment = self.store.assignment();
        let hostname = if self.store.is_valid() && !self.store.name().is_empty() {
            self.store.name().to_string()
        } else {
            default_name.to_string()
        };
        match assignment {
            Some(a) => info!("Connectivity: restoring {} as '{}'", a.address, hostname),
            None => info!("Connectivity: fresh start as '{}' (DHCP)", hostname),
        }
        hw.begin(&hostname, assignment.as_ref())?;

        while !hw.is_connected() {
            self.connect_count += 1;
            if self.connect_count > self.settings.acquire_attempts {
                let reason = format!("WiFi connect failed after {} attempts", self.connect_count);
                error!("Connectivity: {}", reason);
                return self.reset_with_reason(hw, &reason, true);
            }
            hw.feed();
            hw.delay_ms(self.settings.acquire_poll_ms);
        }

        self.initial_connect_ms = hw.uptime_ms().saturating_sub(started);
        info!(
            "Connectivity: connected in {} ms after {} polls",
            self.initial_connect_ms, self.connect_count
        );

        if !self.store.is_valid() {
            self.configure_fresh(hw, default_name)?;
        }

        self.transition(ConnectivityState::Connected, listeners);
        Ok(())
    }

    /// Supervise the link once per tick.
    ///
    /// Blocks with linear backoff while the link is down, restarting the
    /// node once the retry ceiling is exceeded.  Afterwards services a
    /// pending firmware-update request.  Returns `Ok(true)` when connected.
    pub fn ensure_connected(
        &mut self,
        hw: &mut impl Platform,
        ota: &mut OtaUpdater,
        listeners: &mut [Box<dyn Communicator>],
    ) -> Result<bool> {
        self.drain_link_events(hw, listeners);

        if !hw.is_connected() {
            self.transition(ConnectivityState::Degraded, listeners);
            let began = hw.uptime_ms();
            while !hw.is_connected() {
                if self.retry_count > self.settings.reconnect_retries {
                    self.reset_with_reason(hw, REASON_RETRIES, true)?;
                    return Ok(false);
                }
                hw.feed();
                if let Err(e) = hw.restart_radio() {
                    warn!("Connectivity: radio restart failed: {}", e);
                }
                self.retry_count += 1;
                let backoff = backoff_delay(self.retry_count, self.settings.reconnect_base_delay_ms);
                info!(
                    "Connectivity: reconnect attempt {} (backoff {} ms)",
                    self.retry_count, backoff
                );
                hw.delay_ms(backoff);
            }
            let took = hw.uptime_ms().saturating_sub(began);
            let average = self.average_connect_ms.update(took as f32);
            info!(
                "Connectivity: reconnected in {} ms (avg {:.0} ms)",
                took, average
            );
            self.retry_count = 0;
            self.reconnects += 1;
        }
        self.transition(ConnectivityState::Connected, listeners);

        if self.update_flag.take() {
            let name = self.store.name().to_string();
            if ota.service(hw, &name) == UpdateOutcome::Installed {
                self.store.mark_invalid();
                self.reset_with_reason(hw, REASON_FIRMWARE, true)?;
            }
        }
        Ok(true)
    }

    /// Persist `reason`, and when `restart` is set, reboot.
    ///
    /// With `restart` the result is always `Err(Error::Restarted)` on
    /// platforms where `restart()` returns; on hardware it never returns.
    pub fn reset_with_reason(
        &mut self,
        hw: &mut (impl StoragePort + SystemPort),
        reason: &str,
        restart: bool,
    ) -> Result<()> {
        self.store.set_reset_reason(reason);
        let saved = self.store.save(hw);
        if !restart {
            saved?;
            info!("Connectivity: reset reason recorded: '{}'", self.store.reset_reason());
            return Ok(());
        }
        if let Err(e) = saved {
            error!("Connectivity: reset reason not persisted: {}", e);
        }
        warn!("Connectivity: restarting: '{}'", self.store.reset_reason());
        hw.delay_ms(RESTART_GRACE_MS);
        hw.restart();
        Err(Error::Restarted)
    }

    /// Tell `listeners` about a link that came up before they were ready.
    pub fn announce(&self, listeners: &mut [Box<dyn Communicator>]) {
        if self.state == ConnectivityState::Connected {
            for listener in listeners.iter_mut() {
                listener.network_connected();
            }
        }
    }

    /// Invalidate the record so the next boot starts fresh, then restart.
    pub fn invalidate_and_restart(
        &mut self,
        hw: &mut (impl StoragePort + SystemPort),
        reason: &str,
    ) -> Result<()> {
        self.store.mark_invalid();
        self.reset_with_reason(hw, reason, true)
    }

    /// Fetch this node's name from the name service.
    ///
    /// Returns the trimmed first line of the response body, or `None` on
    /// any network failure, non-200 status, or empty answer.
    pub fn lookup_name(&self, hw: &mut (impl HttpPort + NetworkPort)) -> Option<String> {
        let url = format!(
            "{}{}",
            self.settings.name_service_url,
            device_id::mac_path(&hw.mac_address())
        );
        let response = match hw.get(&url, NAME_BODY_LIMIT) {
            Ok(r) => r,
            Err(e) => {
                warn!("Connectivity: name lookup {} failed: {}", url, e);
                return None;
            }
        };
        if response.status != 200 {
            warn!("Connectivity: name lookup {} returned {}", url, response.status);
            return None;
        }
        let body = String::from_utf8_lossy(&response.body);
        let name = body.lines().next().unwrap_or_default().trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn node_name(&self) -> &str {
        self.store.name()
    }

    pub fn reset_reason(&self) -> &str {
        self.store.reset_reason()
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn update_flag(&self) -> UpdateFlag {
        self.update_flag.clone()
    }

    pub fn connect_count(&self) -> u32 {
        self.connect_count
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn initial_connect_ms(&self) -> u64 {
        self.initial_connect_ms
    }

    pub fn average_connect_ms(&self) -> f32 {
        self.average_connect_ms.value()
    }

    pub fn statistics(&self) -> Statistics {
        StatsBuilder::new()
            .add("connectCount", self.connect_count)
            .add("retryCount", self.retry_count)
            .add("reconnects", self.reconnects)
            .add("linkEvents", self.link_events)
            .add("initialConnectTime", self.initial_connect_ms)
            .add("averageConnectDuration", format!("{:.0}", self.average_connect_ms.value()))
            .build()
    }

    // ── Internal ──────────────────────────────────────────────

    /// First-time configuration. Only a looked-up name is persisted; without
    /// one the default name is used for this session and the record stays
    /// unconfigured so the next boot asks again.
    fn configure_fresh(&mut self, hw: &mut impl Platform, default_name: &str) -> Result<()> {
        let Some(name) = self.lookup_name(hw) else {
            info!(
                "Connectivity: no name assigned, running as '{}' until next boot",
                default_name
            );
            self.store.set_name(default_name);
            return Ok(());
        };
        self.store.set_name(&name);
        if let Some(assignment) = hw.assignment() {
            self.store.set_assignment(assignment);
        }
        self.store.set_reset_reason(REASON_FRESH);
        self.store.mark_valid();
        self.store.save(hw)?;
        info!(
            "Connectivity: configured as '{}' at {}",
            self.store.name(),
            self.store.record().assignment.address
        );
        Ok(())
    }

    fn drain_link_events(
        &mut self,
        hw: &mut impl NetworkPort,
        listeners: &mut [Box<dyn Communicator>],
    ) {
        while let Some(event) = hw.poll_link_event() {
            self.link_events += 1;
            debug!("Connectivity: link event {:?}", event);
            if event.is_offline() {
                self.transition(ConnectivityState::Degraded, listeners);
            }
        }
    }

    fn transition(&mut self, to: ConnectivityState, listeners: &mut [Box<dyn Communicator>]) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        match to {
            ConnectivityState::Connected => {
                for listener in listeners.iter_mut() {
                    listener.network_connected();
                }
            }
            ConnectivityState::Degraded if from == ConnectivityState::Connected => {
                for listener in listeners.iter_mut() {
                    listener.network_disconnected();
                }
            }
            _ => {}
        }
        debug!("Connectivity: {:?} -> {:?}", from, to);
    }
}
