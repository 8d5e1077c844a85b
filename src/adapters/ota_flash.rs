//! Inactive-slot firmware writer backed by the `esp-ota` crate.
//!
//! Implements [`FlashPort`].  The `esp-ota` crate provides a safe wrapper
//! around the ESP-IDF OTA partition API; dropping an unfinished
//! `OtaUpdate` aborts it.  On simulation targets the image is kept in
//! memory against a fixed slot size.

use log::{info, warn};

use crate::app::ports::{FlashError, FlashPort};

/// Platform codes reported as `Abort finish failed: <code>`.
pub const FINALIZE_VERIFY_FAILED: i32 = 1;
pub const FINALIZE_BOOT_SET_FAILED: i32 = 2;
pub const FINALIZE_INCOMPLETE: i32 = 3;

/// Simulated inactive slot: 1.5 MB, the usual two-slot ESP32 layout.
#[cfg(not(target_os = "espidf"))]
pub const SIM_SLOT_SIZE: usize = 0x18_0000;

pub struct FlashAdapter {
    expected: usize,
    written: usize,
    #[cfg(target_os = "espidf")]
    update: Option<esp_ota::OtaUpdate>,
    #[cfg(not(target_os = "espidf"))]
    image: Option<Vec<u8>>,
    #[cfg(not(target_os = "espidf"))]
    installed: Option<Vec<u8>>,
}

impl Default for FlashAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashAdapter {
    pub fn new() -> Self {
        Self {
            expected: 0,
            written: 0,
            #[cfg(target_os = "espidf")]
            update: None,
            #[cfg(not(target_os = "espidf"))]
            image: None,
            #[cfg(not(target_os = "espidf"))]
            installed: None,
        }
    }

    /// Size of the slot the next image would be written to.
    #[cfg(target_os = "espidf")]
    pub fn slot_size() -> usize {
        // SAFETY: returns a pointer into the static partition table or null.
        let part = unsafe { esp_idf_svc::sys::esp_ota_get_next_update_partition(core::ptr::null()) };
        if part.is_null() {
            return 0;
        }
        unsafe { (*part).size as usize }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn slot_size() -> usize {
        SIM_SLOT_SIZE
    }

    /// Simulation: the image made bootable by the last successful finalize.
    #[cfg(not(target_os = "espidf"))]
    pub fn installed_image(&self) -> Option<&[u8]> {
        self.installed.as_deref()
    }

    fn in_progress(&self) -> bool {
        #[cfg(target_os = "espidf")]
        {
            self.update.is_some()
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.image.is_some()
        }
    }
}

impl FlashPort for FlashAdapter {
    fn begin_update(&mut self, size: usize) -> Result<(), FlashError> {
        let slot = Self::slot_size();
        if size > slot {
            warn!("Flash: image of {} bytes exceeds slot of {} bytes", size, slot);
            return Err(FlashError::NoSpace);
        }
        self.abort_update();

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("Flash: esp-ota begin failed: {:?}", e);
                FlashError::BeginFailed
            })?;
            self.update = Some(update);
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.image = Some(Vec::with_capacity(size));
        }

        self.expected = size;
        self.written = 0;
        info!("Flash: begin ({} bytes)", size);
        Ok(())
    }

    fn write_update(&mut self, data: &[u8]) -> Result<(), FlashError> {
        if self.written + data.len() > self.expected {
            return Err(FlashError::WriteFailed);
        }

        #[cfg(target_os = "espidf")]
        {
            let update = self.update.as_mut().ok_or(FlashError::NotStarted)?;
            update.write(data).map_err(|e| {
                warn!("Flash: esp-ota write failed: {:?}", e);
                FlashError::WriteFailed
            })?;
        }
        #[cfg(not(target_os = "espidf"))]
        {
            let image = self.image.as_mut().ok_or(FlashError::NotStarted)?;
            image.extend_from_slice(data);
        }

        self.written += data.len();
        Ok(())
    }

    fn finalize_update(&mut self) -> Result<(), FlashError> {
        if !self.in_progress() {
            return Err(FlashError::NotStarted);
        }
        if self.written != self.expected {
            self.abort_update();
            return Err(FlashError::FinalizeFailed(FINALIZE_INCOMPLETE));
        }

        #[cfg(target_os = "espidf")]
        {
            let update = self.update.take().ok_or(FlashError::NotStarted)?;
            let mut completed = update.finalize().map_err(|e| {
                warn!("Flash: esp-ota finalize failed: {:?}", e);
                FlashError::FinalizeFailed(FINALIZE_VERIFY_FAILED)
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("Flash: esp-ota set_as_boot_partition failed: {:?}", e);
                FlashError::FinalizeFailed(FINALIZE_BOOT_SET_FAILED)
            })?;
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.installed = self.image.take();
        }

        info!("Flash: {} bytes finalized, boot slot switched", self.written);
        Ok(())
    }

    fn abort_update(&mut self) {
        if !self.in_progress() {
            return;
        }
        #[cfg(target_os = "espidf")]
        {
            // esp-ota aborts automatically when OtaUpdate is dropped
            self.update.take();
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.image.take();
        }
        warn!("Flash: aborted after {} of {} bytes", self.written, self.expected);
        self.written = 0;
        self.expected = 0;
    }
}
