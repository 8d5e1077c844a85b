//! SensorNode Firmware: Main Entry Point
//!
//! Hexagonal architecture: every adapter implements one port trait and the
//! [`HardwareAdapter`] bundles them into the single `hw` context the node
//! service runs against.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter    WifiAdapter    HttpAdapter    FlashAdapter      │
//! │  (Storage)     (Network)      (Http)         (Flash)           │
//! │  MulticastChannel   SystemAdapter   Watchdog   LogCommunicator │
//! │  (CommandChannel)   (System)        (Watchdog) (Communicator)  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              NodeService (pure logic)                  │    │
//! │  │  Connectivity · CommandProtocol · OTA                  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;

use sensornode::adapters::device_id;
use sensornode::adapters::hardware::HardwareAdapter;
use sensornode::adapters::http::HttpAdapter;
use sensornode::adapters::log_sink::LogCommunicator;
use sensornode::adapters::nvs::NvsAdapter;
use sensornode::adapters::system::SystemAdapter;
use sensornode::adapters::wifi::WifiAdapter;
use sensornode::app::commands::CommandReply;
use sensornode::app::config_store::ConfigStore;
use sensornode::app::ota;
use sensornode::app::protocol::NodeInfo;
use sensornode::app::ports::NetworkPort;
use sensornode::app::service::NodeService;
use sensornode::config::NodeConfig;
use sensornode::diagnostics;
use sensornode::drivers::status_led::StatusLed;
use sensornode::version::FIRMWARE_VERSION;

type LedPin = PinDriver<'static, AnyOutputPin, Output>;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SensorNode v{}                    ║", FIRMWARE_VERSION);
    info!("╚══════════════════════════════════════╝");

    // ── 1b. OTA rollback check ─────────────────────────────────
    ota::check_rollback();

    // ── 2. Load config and device record from NVS ─────────────
    let mut storage = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init failed: {}", e))?;
    diagnostics::install_panic_handler(storage.clone());
    let config = NodeConfig::provision(&mut storage, option_env!("SENSORNODE_CONFIG"));
    log::set_max_level(config.log_level());
    let store = ConfigStore::load(&storage);
    info!(
        "Device record: name='{}' valid={} reason='{}'",
        store.name(),
        store.is_valid(),
        store.reset_reason()
    );

    // ── 3. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = storage.partition();

    let led = if config.err_led_gpio >= 0 {
        // SAFETY: the pin number comes from validated config and is not
        // claimed by any other driver.
        let pin = unsafe { AnyOutputPin::new(config.err_led_gpio) };
        match PinDriver::output(pin) {
            Ok(driver) => Some(StatusLed::new(driver)),
            Err(e) => {
                warn!("Error LED on GPIO{} unavailable: {}", config.err_led_gpio, e);
                None
            }
        }
    } else {
        None
    };

    let wifi = WifiAdapter::new(peripherals.modem, sysloop, Some(nvs_partition), &config)
        .map_err(|e| anyhow::anyhow!("WiFi init failed: {}", e))?;
    let mut hw: HardwareAdapter<LedPin> = HardwareAdapter::new(
        storage,
        wifi,
        HttpAdapter::new(&config),
        SystemAdapter::new(led),
    );

    let default_name = device_id::default_name(&hw.mac_address());
    info!(
        "Device ID: {} (default name: {})",
        device_id::mac_string(&hw.mac_address()),
        default_name
    );

    // ── 4. Node service ───────────────────────────────────────
    let config_json = config.to_json();
    let mut node = NodeService::new(config, store);
    node.add_communicator(Box::new(LogCommunicator::new()));
    node.register_command(
        "CONFIG",
        Box::new(move |info: &NodeInfo| CommandReply::text(format!("OK CONFIG:{}\n{}", info.name, config_json))),
    );

    info!("System ready. Entering main loop.");
    node.run(&mut hw, &default_name)
}
