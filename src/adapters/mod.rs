//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements          | Connects to                 |
//! |--------------|---------------------|-----------------------------|
//! | `hardware`   | Platform (all)      | Delegates to the adapters   |
//! | `http`       | HttpPort            | ESP-IDF HTTP client         |
//! | `log_sink`   | Communicator        | Serial log output           |
//! | `multicast`  | CommandChannelPort  | UDP multicast socket (lwIP) |
//! | `nvs`        | StoragePort         | NVS / in-memory store       |
//! | `ota_flash`  | FlashPort           | Inactive OTA slot (esp-ota) |
//! | `system`     | SystemPort          | Timer, reset, error LED     |
//! | `wifi`       | NetworkPort         | ESP-IDF WiFi STA            |

pub mod device_id;
pub mod hardware;
pub mod http;
pub mod log_sink;
pub mod multicast;
pub mod nvs;
pub mod ota_flash;
pub mod system;
pub mod wifi;
