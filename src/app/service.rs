//! Node service, the hexagonal core.
//!
//! [`NodeService`] owns the connectivity manager, command protocol, OTA
//! updater and the registered sensors and communicators.  All I/O flows
//! through the port traits of one `hw` context injected at call sites, so
//! the whole lifecycle is testable with a mock board.
//!
//! ```text
//!  Booting ─▶ AcquiringNetwork ─▶ SettingUpSensors ─▶ SettingUpCommunicators ─▶ Running
//!                                        │                                       │
//!                                        └──────────────▶ FatalError ◀───────────┘
//! ```

use std::net::Ipv4Addr;

use log::{error, info, warn};

use crate::adapters::device_id;
use crate::config::NodeConfig;
use crate::diagnostics::{Ema, RuntimeMetrics, Statistics, StatisticsProvider, render_statistics};
use crate::error::{Error, Result};
use crate::events::UpdateFlag;
use crate::version::FIRMWARE_VERSION;

use super::commands::CommandAction;
use super::components::{Communicator, Readable};
use super::config_store::ConfigStore;
use super::connectivity::{ConnectSettings, ConnectivityManager, REASON_WATCHDOG};
use super::ota::OtaUpdater;
use super::ports::Platform;
use super::protocol::{CommandHandler, CommandProtocol, NodeInfo, ProtocolState};

/// Receive buffer for command datagrams.  Anything that fills it is
/// longer than a token and gets dropped.
const DATAGRAM_BUF: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Booting,
    AcquiringNetwork,
    SettingUpSensors,
    SettingUpCommunicators,
    Running,
    FatalError,
}

pub struct NodeService {
    config: NodeConfig,
    state: NodeState,
    default_name: String,
    connectivity: ConnectivityManager,
    protocol: CommandProtocol,
    ota: OtaUpdater,
    sensors: Vec<Box<dyn Readable>>,
    communicators: Vec<Box<dyn Communicator>>,
    sensor_setup_ms: u64,
    comm_setup_ms: u64,
    loop_ms: Ema,
    tick_count: u64,
}

impl NodeService {
    /// Build the service around a loaded device record.
    ///
    /// Does **not** touch hardware; call [`boot`](Self::boot) next.
    pub fn new(config: NodeConfig, store: ConfigStore) -> Self {
        let update_flag = UpdateFlag::new();
        let connectivity =
            ConnectivityManager::new(ConnectSettings::from(&config), store, update_flag.clone());
        let protocol = CommandProtocol::new(update_flag);
        let ota = OtaUpdater::new(&config.firmware_base_url, config.ota_chunk_size);
        Self {
            config,
            state: NodeState::Booting,
            default_name: String::new(),
            connectivity,
            protocol,
            ota,
            sensors: Vec::new(),
            communicators: Vec::new(),
            sensor_setup_ms: 0,
            comm_setup_ms: 0,
            loop_ms: Ema::new(),
            tick_count: 0,
        }
    }

    /// Replace the OTA updater (e.g. to pin the local version).
    pub fn with_ota(mut self, ota: OtaUpdater) -> Self {
        self.ota = ota;
        self
    }

    // ── Registration ──────────────────────────────────────────

    pub fn add_sensor(&mut self, sensor: Box<dyn Readable>) {
        self.sensors.push(sensor);
    }

    pub fn add_communicator(&mut self, communicator: Box<dyn Communicator>) {
        self.communicators.push(communicator);
    }

    /// Add a command token.  See [`CommandProtocol::register`].
    pub fn register_command(&mut self, token: &str, handler: CommandHandler) -> bool {
        self.protocol.register(token, handler)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Arm the watchdog, acquire the network, set up sensors then
    /// communicators, and start listening for commands.
    ///
    /// `Err(Error::Halted)` means a sensor failed to initialise.
    pub fn boot(&mut self, hw: &mut impl Platform, default_name: &str) -> Result<()> {
        self.state = NodeState::Booting;
        self.default_name = default_name.to_string();
        hw.arm(self.config.watchdog_timeout_ms);
        info!("Node: booting firmware {} as '{}'", FIRMWARE_VERSION, default_name);
        if hw.fired_last_boot() {
            warn!("Node: previous boot ended in a watchdog reset");
            if let Err(e) = self.connectivity.reset_with_reason(hw, REASON_WATCHDOG, false) {
                error!("Node: watchdog reset reason not persisted: {}", e);
            }
        }

        // Communicators hear about the link once they are set up.
        self.state = NodeState::AcquiringNetwork;
        self.connectivity.acquire(hw, default_name, &mut [])?;

        self.state = NodeState::SettingUpSensors;
        let started = hw.uptime_ms();
        for sensor in &mut self.sensors {
            hw.feed();
            let t = hw.uptime_ms();
            if let Err(status) = sensor.setup() {
                error!("Node: sensor {} setup failed: {}", sensor.name(), status);
                self.state = NodeState::FatalError;
                return Err(Error::Halted);
            }
            info!(
                "Node: sensor {} ready in {} ms",
                sensor.name(),
                hw.uptime_ms().saturating_sub(t)
            );
        }
        self.sensor_setup_ms = hw.uptime_ms().saturating_sub(started);

        self.state = NodeState::SettingUpCommunicators;
        let started = hw.uptime_ms();
        for communicator in &mut self.communicators {
            hw.feed();
            communicator.setup();
        }
        self.connectivity.announce(&mut self.communicators);
        let status = self.hardware_status(&*hw);
        for communicator in &mut self.communicators {
            communicator.new_hardware_status(&status);
        }
        self.comm_setup_ms = hw.uptime_ms().saturating_sub(started);

        self.listen(hw);
        self.state = NodeState::Running;
        info!("Node: running as '{}' ({})", self.node_name(), status);
        Ok(())
    }

    /// One main-loop iteration.
    pub fn tick(&mut self, hw: &mut impl Platform) -> Result<()> {
        match self.state {
            NodeState::Running => {}
            NodeState::FatalError => return Err(Error::Halted),
            other => {
                warn!("Node: tick ignored in {:?}", other);
                return Ok(());
            }
        }
        let started = hw.uptime_ms();
        self.tick_count += 1;
        hw.feed();

        let connected =
            self.connectivity
                .ensure_connected(hw, &mut self.ota, &mut self.communicators)?;
        if connected {
            self.read_sensors(hw)?;
        }
        for communicator in &mut self.communicators {
            communicator.service();
        }
        self.poll_commands(hw)?;

        let took = hw.uptime_ms().saturating_sub(started);
        self.loop_ms.update(took as f32);
        let interval = u64::from(self.config.loop_interval_ms);
        if took < interval {
            hw.delay_ms((interval - took) as u32);
        }
        Ok(())
    }

    /// Boot and tick forever.  Never returns: terminal conditions end in
    /// the error-indicator loop or a restart.
    pub fn run(mut self, hw: &mut impl Platform, default_name: &str) -> ! {
        let err = match self.boot(hw, default_name) {
            Ok(()) => loop {
                if let Err(e) = self.tick(hw) {
                    break e;
                }
            },
            Err(e) => e,
        };
        match err {
            Error::Halted => self.halt(hw),
            Error::Restarted => {}
            other => self.restart_after_fatal(hw, &other),
        }
        // Reached only where restart() returns.
        loop {
            hw.feed();
            hw.delay_ms(1000);
        }
    }

    /// Record `Fatal: <err>` as the reset reason and restart.
    pub fn restart_after_fatal(&mut self, hw: &mut impl Platform, err: &Error) {
        error!("Node: unrecoverable error: {}", err);
        let reason = format!("Fatal: {}", err);
        match self.connectivity.reset_with_reason(hw, &reason, true) {
            Ok(()) | Err(Error::Restarted) => {}
            Err(e) => error!("Node: restart after fatal error failed: {}", e),
        }
    }

    /// Error-indicator loop.  Keeps the watchdog fed so the node stays
    /// halted instead of rebooting into the same failure.
    pub fn halt(&mut self, hw: &mut impl Platform) -> ! {
        self.state = NodeState::FatalError;
        error!("Node: halted");
        loop {
            hw.feed();
            hw.error_blink();
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Persisted name, or the default name before one is configured.
    pub fn node_name(&self) -> &str {
        let name = self.connectivity.node_name();
        if name.is_empty() { &self.default_name } else { name }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &ConnectivityManager {
        &self.connectivity
    }

    pub fn protocol(&self) -> &CommandProtocol {
        &self.protocol
    }

    pub fn ota(&self) -> &OtaUpdater {
        &self.ota
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn average_loop_ms(&self) -> f32 {
        self.loop_ms.value()
    }

    /// `STARTED: <cause0>:<cause1> <reset reason>`
    pub fn hardware_status(&self, hw: &impl Platform) -> String {
        let [c0, c1] = hw.reset_causes();
        format!("STARTED: {}:{} {}", c0, c1, self.connectivity.reset_reason())
    }

    /// Statistics of the node itself.
    pub fn hardware_statistics(&self) -> Statistics {
        let metrics = RuntimeMetrics::collect();
        let mut stats = self.connectivity.statistics();
        stats.extend([
            ("commSetupTime".to_string(), self.comm_setup_ms.to_string()),
            ("sensorSetupTime".to_string(), self.sensor_setup_ms.to_string()),
            (
                "averageSensorLoopDuration".to_string(),
                format!("{:.0}", self.loop_ms.value()),
            ),
            ("tickCount".to_string(), self.tick_count.to_string()),
            ("heapFree".to_string(), metrics.heap_free.to_string()),
            ("heapMinFree".to_string(), metrics.heap_min_free.to_string()),
        ]);
        stats
    }

    /// Every component's statistics as `<component>.<key>:<value>` lines.
    pub fn render_all_statistics(&self) -> String {
        let mut out = String::new();
        render_statistics(&mut out, "Hardware", &self.hardware_statistics());
        render_statistics(&mut out, "OTA", &self.ota.statistics());
        render_statistics(&mut out, "Protocol", &self.protocol.statistics());
        for communicator in &self.communicators {
            render_statistics(&mut out, communicator.name(), &communicator.statistics());
        }
        for sensor in &self.sensors {
            render_statistics(&mut out, sensor.name(), &sensor.statistics());
        }
        out
    }

    pub fn node_info(&self, hw: &impl Platform) -> NodeInfo {
        NodeInfo {
            name: self.node_name().to_string(),
            version: FIRMWARE_VERSION,
            reset_reason: self.connectivity.reset_reason().to_string(),
            uptime_ms: hw.uptime_ms(),
            reset_causes: hw.reset_causes(),
            local_ip: hw
                .assignment()
                .map_or(Ipv4Addr::UNSPECIFIED, |a| a.address),
            mac: device_id::mac_string(&hw.mac_address()),
            statistics: self.render_all_statistics(),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn listen(&mut self, hw: &mut impl Platform) {
        if let Err(e) = self
            .protocol
            .listen(hw, self.config.command_group(), self.config.command_port)
        {
            warn!("Node: command channel unavailable: {}", e);
        }
    }

    /// Read every sensor in registration order and fan out each result to
    /// every communicator before moving to the next sensor.
    fn read_sensors(&mut self, hw: &mut impl Platform) -> Result<()> {
        let mut fatal = false;
        for sensor in &mut self.sensors {
            hw.feed();
            match sensor.read(hw.uptime_ms()) {
                Ok(reading) => {
                    for communicator in &mut self.communicators {
                        communicator.new_reading(sensor.name(), &reading);
                    }
                }
                Err(status) => {
                    warn!("Node: sensor {}: {}", sensor.name(), status);
                    for communicator in &mut self.communicators {
                        communicator.new_status(sensor.name(), &status);
                    }
                    fatal |= status.fatal;
                }
            }
        }
        if fatal {
            self.state = NodeState::FatalError;
            return Err(Error::Halted);
        }
        Ok(())
    }

    fn poll_commands(&mut self, hw: &mut impl Platform) -> Result<()> {
        if self.protocol.state() != ProtocolState::Listening {
            self.listen(hw);
            return Ok(());
        }
        let mut buf = [0u8; DATAGRAM_BUF];
        while let Some((len, peer)) = hw.receive(&mut buf) {
            let len = len.min(buf.len());
            let Some(token) = self.protocol.accept(&buf[..len]) else {
                continue;
            };
            let info = self.node_info(&*hw);
            let Some(reply) = self.protocol.dispatch(&token, &info) else {
                continue;
            };
            if let Some(text) = reply.reply.as_deref() {
                hw.reply(peer, text);
            }
            match reply.action {
                CommandAction::None => {}
                CommandAction::Reset { reason } => {
                    self.connectivity.reset_with_reason(hw, reason, true)?;
                }
                CommandAction::Reconfigure { reason } => {
                    self.connectivity.invalidate_and_restart(hw, reason)?;
                }
            }
        }
        Ok(())
    }
}
