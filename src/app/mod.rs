//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the node lifecycle: network acquisition and
//! supervision, the multicast command protocol, and over-the-air updates.
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer fully testable without real peripherals.

pub mod commands;
pub mod components;
pub mod config_store;
pub mod connectivity;
pub mod ota;
pub mod ports;
pub mod protocol;
pub mod service;
