//! WiFi station-mode adapter.
//!
//! Implements [`NetworkPort`], the hexagonal boundary for network
//! connectivity.  Link changes reported by the network stack are pushed
//! into [`LINK_EVENTS`](crate::events::LINK_EVENTS) from the event-loop
//! callbacks and drained by the main loop.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver calls via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Static restore
//!
//! With an assignment the station netif is swapped for one with a fixed
//! address, gateway, mask and the configured DNS pair; without one the
//! default DHCP client netif is used.

use std::net::Ipv4Addr;

use log::{info, warn};

use crate::app::ports::{NetworkAssignment, NetworkError, NetworkPort};
use crate::config::NodeConfig;
use crate::events::{self, LinkEvent};

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::{EspSubscription, EspSystemEventLoop, System},
    hal::modem::Modem,
    ipv4::{
        ClientConfiguration as IpClientConfiguration, ClientSettings as IpClientSettings,
        Configuration as IpConfiguration, Mask, Subnet,
    },
    netif::{EspNetif, IpEvent, NetifConfiguration},
    nvs::EspDefaultNvsPartition,
    sys::EspError,
    wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent},
};

/// Dotted mask for a prefix length, e.g. 24 → 255.255.255.0.
pub fn prefix_to_mask(bits: u8) -> Ipv4Addr {
    let bits = u32::from(bits.min(32));
    let raw = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
    Ipv4Addr::from(raw)
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF adapter
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WifiAdapter {
    wifi: EspWifi<'static>,
    ssid: String,
    password: String,
    dns: (Ipv4Addr, Ipv4Addr),
    _wifi_events: EspSubscription<'static, System>,
    _ip_events: EspSubscription<'static, System>,
}

#[cfg(target_os = "espidf")]
fn driver(e: EspError) -> NetworkError {
    NetworkError::DriverFailed(e.code())
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        config: &NodeConfig,
    ) -> Result<Self, NetworkError> {
        let wifi = EspWifi::new(modem, sysloop.clone(), nvs).map_err(driver)?;

        // Callbacks only enqueue; the main loop does the work.
        let wifi_events = sysloop
            .subscribe::<WifiEvent, _>(|event| match event {
                WifiEvent::StaConnected(..) => {
                    events::push_link_event(LinkEvent::Up);
                }
                WifiEvent::StaDisconnected(..) => {
                    events::push_link_event(LinkEvent::Down);
                }
                _ => {}
            })
            .map_err(driver)?;
        let ip_events = sysloop
            .subscribe::<IpEvent, _>(|event| match event {
                IpEvent::DhcpIpAssigned(..) => {
                    events::push_link_event(LinkEvent::GotAddress);
                }
                IpEvent::DhcpIpDeassigned(..) => {
                    events::push_link_event(LinkEvent::LostAddress);
                }
                _ => {}
            })
            .map_err(driver)?;

        Ok(Self {
            wifi,
            ssid: config.ssid.clone(),
            password: config.password.clone(),
            dns: (config.primary_dns(), config.secondary_dns()),
            _wifi_events: wifi_events,
            _ip_events: ip_events,
        })
    }

    fn netif_configuration(
        &self,
        assignment: Option<&NetworkAssignment>,
    ) -> Result<NetifConfiguration, NetworkError> {
        let Some(a) = assignment else {
            return Ok(NetifConfiguration::wifi_default_client());
        };
        let mask = Mask::try_from(a.mask).map_err(|_| NetworkError::InvalidAssignment)?;
        Ok(NetifConfiguration {
            ip_configuration: Some(IpConfiguration::Client(IpClientConfiguration::Fixed(
                IpClientSettings {
                    ip: a.address,
                    subnet: Subnet {
                        gateway: a.gateway,
                        mask,
                    },
                    dns: Some(self.dns.0),
                    secondary_dns: Some(self.dns.1),
                },
            ))),
            ..NetifConfiguration::wifi_default_client()
        })
    }

    fn client_configuration(&self) -> Result<Configuration, NetworkError> {
        Ok(Configuration::Client(ClientConfiguration {
            ssid: self
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| NetworkError::NoCredentials)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| NetworkError::NoCredentials)?,
            auth_method: if self.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        }))
    }
}

#[cfg(target_os = "espidf")]
impl NetworkPort for WifiAdapter {
    fn begin(
        &mut self,
        hostname: &str,
        assignment: Option<&NetworkAssignment>,
    ) -> Result<(), NetworkError> {
        if self.ssid.is_empty() {
            return Err(NetworkError::NoCredentials);
        }
        if self.wifi.is_started().unwrap_or(false) {
            let _ = self.wifi.stop();
        }

        let netif = EspNetif::new_with_conf(&self.netif_configuration(assignment)?).map_err(driver)?;
        self.wifi.swap_netif_sta(netif).map_err(driver)?;
        if let Err(e) = self.wifi.sta_netif_mut().set_hostname(hostname) {
            warn!("WiFi: hostname '{}' rejected: {}", hostname, e);
        }

        let client = self.client_configuration()?;
        self.wifi.set_configuration(&client).map_err(driver)?;
        self.wifi.start().map_err(driver)?;
        self.wifi.connect().map_err(driver)?;
        info!("WiFi: associating with '{}' as '{}'", self.ssid, hostname);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn restart_radio(&mut self) -> Result<(), NetworkError> {
        let _ = self.wifi.disconnect();
        let _ = self.wifi.stop();
        self.wifi.start().map_err(driver)?;
        self.wifi.connect().map_err(driver)?;
        info!("WiFi: radio restarted");
        Ok(())
    }

    fn assignment(&self) -> Option<NetworkAssignment> {
        let info = self.wifi.sta_netif().get_ip_info().ok()?;
        if info.ip.is_unspecified() {
            return None;
        }
        Some(NetworkAssignment {
            address: info.ip,
            gateway: info.subnet.gateway,
            mask: prefix_to_mask(info.subnet.mask.0),
        })
    }

    fn mac_address(&self) -> [u8; 6] {
        self.wifi
            .sta_netif()
            .get_mac()
            .unwrap_or_else(|_| crate::adapters::device_id::read_mac())
    }

    fn poll_link_event(&mut self) -> Option<LinkEvent> {
        events::pop_link_event()
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation adapter
// ───────────────────────────────────────────────────────────────

/// Host stand-in: associates instantly and hands out a fixed DHCP lease.
#[cfg(not(target_os = "espidf"))]
pub struct WifiAdapter {
    ssid: String,
    hostname: String,
    connected: bool,
    assignment: Option<NetworkAssignment>,
    begins: u32,
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    /// Lease handed out when no assignment is restored.
    pub const SIM_LEASE: NetworkAssignment = NetworkAssignment {
        address: Ipv4Addr::new(192, 168, 4, 2),
        gateway: Ipv4Addr::new(192, 168, 4, 1),
        mask: Ipv4Addr::new(255, 255, 255, 0),
    };

    pub fn new(config: &NodeConfig) -> Self {
        Self {
            ssid: config.ssid.clone(),
            hostname: String::new(),
            connected: false,
            assignment: None,
            begins: 0,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn begins(&self) -> u32 {
        self.begins
    }

    /// Simulate the access point dropping the station.
    pub fn drop_link(&mut self) {
        self.connected = false;
        events::push_link_event(LinkEvent::Down);
    }
}

#[cfg(not(target_os = "espidf"))]
impl NetworkPort for WifiAdapter {
    fn begin(
        &mut self,
        hostname: &str,
        assignment: Option<&NetworkAssignment>,
    ) -> Result<(), NetworkError> {
        if self.ssid.is_empty() {
            return Err(NetworkError::NoCredentials);
        }
        self.begins += 1;
        self.hostname = hostname.to_string();
        self.assignment = Some(assignment.copied().unwrap_or(Self::SIM_LEASE));
        self.connected = true;
        info!("WiFi(sim): connected to '{}' as '{}'", self.ssid, hostname);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn restart_radio(&mut self) -> Result<(), NetworkError> {
        warn!("WiFi(sim): radio restart");
        self.connected = true;
        Ok(())
    }

    fn assignment(&self) -> Option<NetworkAssignment> {
        if self.connected { self.assignment } else { None }
    }

    fn mac_address(&self) -> [u8; 6] {
        crate::adapters::device_id::read_mac()
    }

    fn poll_link_event(&mut self) -> Option<LinkEvent> {
        events::pop_link_event()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
