//! Flash key/value storage behind [`StoragePort`].
//!
//! On the device every access opens the namespace through `EspNvs` on the
//! default partition and lets it drop again, so no handle outlives a call.
//! Off-device the backend is a shared in-memory map. Clones address the
//! same storage on both backends.

use crate::app::ports::{ConfigError, StorageError, StoragePort};
use log::info;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::{EspError, ESP_ERR_NVS_NOT_ENOUGH_SPACE, ESP_ERR_NVS_NOT_FOUND};
#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;
#[cfg(not(target_os = "espidf"))]
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct NvsAdapter {
    #[cfg(target_os = "espidf")]
    partition: EspDefaultNvsPartition,
    #[cfg(not(target_os = "espidf"))]
    entries: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
}

#[cfg(target_os = "espidf")]
impl NvsAdapter {
    /// Take the default partition. The first boot on a fresh or
    /// version-mismatched partition erases it.
    pub fn new() -> Result<Self, ConfigError> {
        let partition = EspDefaultNvsPartition::take().map_err(|e| {
            warn!("NvsAdapter: default partition unavailable ({})", e);
            ConfigError::IoError
        })?;
        info!("NvsAdapter: default partition ready");
        Ok(Self { partition })
    }

    /// The partition handle, shared with the WiFi driver.
    pub fn partition(&self) -> EspDefaultNvsPartition {
        self.partition.clone()
    }

    fn open(&self, namespace: &str, read_write: bool) -> Result<EspNvs<NvsDefault>, EspError> {
        EspNvs::new(self.partition.clone(), namespace, read_write)
    }
}

#[cfg(target_os = "espidf")]
fn storage_error(namespace: &str, key: &str, e: EspError) -> StorageError {
    let code = e.code();
    if code == ESP_ERR_NVS_NOT_FOUND as i32 {
        StorageError::NotFound
    } else if code == ESP_ERR_NVS_NOT_ENOUGH_SPACE as i32 {
        StorageError::Full
    } else {
        warn!("NvsAdapter: {}::{} failed ({})", namespace, key, e);
        StorageError::IoError
    }
}

#[cfg(target_os = "espidf")]
impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let nvs = self
            .open(namespace, false)
            .map_err(|e| storage_error(namespace, key, e))?;
        match nvs.get_blob(key, buf) {
            Ok(Some(blob)) => Ok(blob.len()),
            Ok(None) => Err(StorageError::NotFound),
            Err(e) => Err(storage_error(namespace, key, e)),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut nvs = self
            .open(namespace, true)
            .map_err(|e| storage_error(namespace, key, e))?;
        nvs.set_blob(key, data)
            .map_err(|e| storage_error(namespace, key, e))
    }
}

#[cfg(not(target_os = "espidf"))]
impl NvsAdapter {
    pub fn new() -> Result<Self, ConfigError> {
        info!("NvsAdapter: simulation backend");
        Ok(Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<(String, String), Vec<u8>>>, StorageError> {
        self.entries.lock().map_err(|_| StorageError::IoError)
    }
}

#[cfg(not(target_os = "espidf"))]
impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let entries = self.entries()?;
        let blob = entries
            .get(&(namespace.to_string(), key.to_string()))
            .ok_or(StorageError::NotFound)?;
        let len = blob.len().min(buf.len());
        buf[..len].copy_from_slice(&blob[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.entries()?
            .insert((namespace.to_string(), key.to_string()), data.to_vec());
        Ok(())
    }
}
