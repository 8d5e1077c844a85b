//! Hardware adapter: bridges the concrete adapters to the domain ports.
//!
//! Owns one adapter per port and delegates every call, so the node service
//! sees a single [`Platform`](crate::app::ports::Platform) behind `hw`.
//! On non-espidf targets the parts use their cfg-gated simulation backends.

use std::net::{Ipv4Addr, SocketAddr};

use embedded_hal::digital::OutputPin;

use crate::adapters::http::HttpAdapter;
use crate::adapters::multicast::MulticastChannel;
use crate::adapters::nvs::NvsAdapter;
use crate::adapters::ota_flash::FlashAdapter;
use crate::adapters::system::SystemAdapter;
use crate::adapters::wifi::WifiAdapter;
use crate::app::ports::{
    ChannelError, CommandChannelPort, FlashError, FlashPort, HttpError, HttpPort, HttpResponse,
    NetworkAssignment, NetworkError, NetworkPort, StorageError, StoragePort, StreamHead,
    SystemPort, WatchdogPort,
};
use crate::drivers::watchdog::Watchdog;
use crate::events::LinkEvent;

/// Concrete adapter that combines all hardware behind the port traits.
pub struct HardwareAdapter<P: OutputPin> {
    pub storage: NvsAdapter,
    pub wifi: WifiAdapter,
    pub http: HttpAdapter,
    pub flash: FlashAdapter,
    pub channel: MulticastChannel,
    pub system: SystemAdapter<P>,
    pub watchdog: Watchdog,
}

impl<P: OutputPin> HardwareAdapter<P> {
    pub fn new(
        storage: NvsAdapter,
        wifi: WifiAdapter,
        http: HttpAdapter,
        system: SystemAdapter<P>,
    ) -> Self {
        Self {
            storage,
            wifi,
            http,
            flash: FlashAdapter::new(),
            channel: MulticastChannel::new(),
            system,
            watchdog: Watchdog::new(),
        }
    }
}

// ── StoragePort ───────────────────────────────────────────────

impl<P: OutputPin> StoragePort for HardwareAdapter<P> {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.storage.read(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.storage.write(namespace, key, data)
    }
}

// ── NetworkPort ───────────────────────────────────────────────

impl<P: OutputPin> NetworkPort for HardwareAdapter<P> {
    fn begin(
        &mut self,
        hostname: &str,
        assignment: Option<&NetworkAssignment>,
    ) -> Result<(), NetworkError> {
        self.wifi.begin(hostname, assignment)
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_connected()
    }

    fn restart_radio(&mut self) -> Result<(), NetworkError> {
        self.wifi.restart_radio()
    }

    fn assignment(&self) -> Option<NetworkAssignment> {
        self.wifi.assignment()
    }

    fn mac_address(&self) -> [u8; 6] {
        self.wifi.mac_address()
    }

    fn poll_link_event(&mut self) -> Option<LinkEvent> {
        self.wifi.poll_link_event()
    }
}

// ── HttpPort ──────────────────────────────────────────────────

impl<P: OutputPin> HttpPort for HardwareAdapter<P> {
    fn get(&mut self, url: &str, max_body: usize) -> Result<HttpResponse, HttpError> {
        self.http.get(url, max_body)
    }

    fn open_stream(&mut self, url: &str) -> Result<StreamHead, HttpError> {
        self.http.open_stream(url)
    }

    fn read_stream(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        self.http.read_stream(buf)
    }

    fn close_stream(&mut self) {
        self.http.close_stream();
    }
}

// ── FlashPort ─────────────────────────────────────────────────

impl<P: OutputPin> FlashPort for HardwareAdapter<P> {
    fn begin_update(&mut self, size: usize) -> Result<(), FlashError> {
        self.flash.begin_update(size)
    }

    fn write_update(&mut self, data: &[u8]) -> Result<(), FlashError> {
        self.flash.write_update(data)
    }

    fn finalize_update(&mut self) -> Result<(), FlashError> {
        self.flash.finalize_update()
    }

    fn abort_update(&mut self) {
        self.flash.abort_update();
    }
}

// ── CommandChannelPort ────────────────────────────────────────

impl<P: OutputPin> CommandChannelPort for HardwareAdapter<P> {
    fn listen(&mut self, group: Ipv4Addr, port: u16) -> Result<(), ChannelError> {
        self.channel.listen(group, port)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
        self.channel.receive(buf)
    }

    fn reply(&mut self, peer: SocketAddr, message: &str) {
        self.channel.reply(peer, message);
    }

    fn broadcast(&mut self, message: &str) {
        self.channel.broadcast(message);
    }
}

// ── SystemPort ────────────────────────────────────────────────

impl<P: OutputPin> SystemPort for HardwareAdapter<P> {
    fn uptime_ms(&self) -> u64 {
        self.system.uptime_ms()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.system.delay_ms(ms);
    }

    fn restart(&mut self) {
        self.system.restart();
    }

    fn reset_causes(&self) -> [&'static str; 2] {
        self.system.reset_causes()
    }

    fn error_blink(&mut self) {
        self.system.error_blink();
    }
}

// ── WatchdogPort ──────────────────────────────────────────────

impl<P: OutputPin> WatchdogPort for HardwareAdapter<P> {
    fn arm(&mut self, timeout_ms: u32) {
        self.watchdog.arm(timeout_ms);
    }

    fn feed(&mut self) {
        self.watchdog.feed();
    }

    fn fired_last_boot(&self) -> bool {
        self.watchdog.fired_last_boot()
    }
}
