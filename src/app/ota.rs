//! Pull-based firmware update from the firmware server.
//!
//! ```text
//! Idle ─▶ CheckingVersion ─(not newer)─▶ Idle
//!               │ newer
//!               ▼
//!          Downloading ─▶ Writing ─▶ Finalizing ─▶ Rebooting
//!               └───────────┴───────────┴──▶ Aborted ─▶ Idle
//! ```
//!
//! Every step reports over the command channel as `OK UPDATE:<name> ...` or
//! `ERR UPDATE:<name> <reason>`.  Failures never reboot: the running
//! firmware stays in place and the updater returns to `Idle`.  Rebooting
//! after a successful install is left to the caller, which owns the device
//! record.

use core::fmt;

use log::{info, warn};

use crate::diagnostics::{Statistics, StatsBuilder};
use crate::version::{self, FIRMWARE_VERSION};

use super::ports::{CommandChannelPort, FlashError, HttpError, HttpPort, Platform};

/// A version descriptor is a bare semver string.
const VERSION_BODY_LIMIT: usize = 64;

// ── Error type ────────────────────────────────────────────────

/// Why an update was abandoned.  `Display` is the text that follows
/// `ERR UPDATE:<name> ` on the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtaError {
    Download(HttpError),
    BadStatus(u16),
    NoSize,
    NotEnoughSpace,
    Flash(FlashError),
    SizeMismatch { written: usize, size: usize },
    FinalizeFailed(i32),
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download(e) => write!(f, "Abort, download failed: {}", e),
            Self::BadStatus(code) => write!(f, "Abort, HTTP status {}", code),
            Self::NoSize => write!(f, "Abort, no size"),
            Self::NotEnoughSpace => write!(f, "Abort, not enough space"),
            Self::Flash(e) => write!(f, "Abort, flash {}", e),
            Self::SizeMismatch { written, size } => {
                write!(f, "Abort, written:{} size:{}", written, size)
            }
            Self::FinalizeFailed(code) => write!(f, "Abort finish failed: {}", code),
        }
    }
}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    CheckingVersion,
    Downloading,
    Writing,
    Finalizing,
    Rebooting,
    Aborted,
}

/// Transient bookkeeping of one download.  Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSession {
    pub expected_size: usize,
    pub bytes_written: usize,
    pub last_error: Option<OtaError>,
}

/// Result of servicing one update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The server has nothing newer.
    NoUpdate,
    /// A new image was written and made bootable; the node should restart.
    Installed,
    /// The update was abandoned; the current firmware keeps running.
    Failed(OtaError),
}

// ── Updater ───────────────────────────────────────────────────

pub struct OtaUpdater {
    base_url: String,
    chunk_size: usize,
    local_version: String,
    state: UpdateState,
    session: Option<UpdateSession>,
    checks: u32,
    started: u32,
    failures: u32,
    last_error: Option<String>,
}

impl OtaUpdater {
    pub fn new(base_url: &str, chunk_size: usize) -> Self {
        Self {
            base_url: base_url.to_string(),
            chunk_size: chunk_size.max(1),
            local_version: FIRMWARE_VERSION.to_string(),
            state: UpdateState::Idle,
            session: None,
            checks: 0,
            started: 0,
            failures: 0,
            last_error: None,
        }
    }

    /// Compare against `local` instead of the compiled-in version.
    pub fn with_local_version(mut self, local: &str) -> Self {
        self.local_version = local.to_string();
        self
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn session(&self) -> Option<&UpdateSession> {
        self.session.as_ref()
    }

    /// Handle one pending update request end to end.
    pub fn service(&mut self, hw: &mut impl Platform, name: &str) -> UpdateOutcome {
        if !self.check_version_available(hw, name) {
            hw.broadcast(&format!("OK UPDATE:{} No update available", name));
            self.state = UpdateState::Idle;
            return UpdateOutcome::NoUpdate;
        }
        match self.run(hw, name) {
            Ok(()) => UpdateOutcome::Installed,
            Err(e) => UpdateOutcome::Failed(e),
        }
    }

    /// `true` only when the server advertises a strictly newer version.
    /// Any network failure counts as "nothing available".
    pub fn check_version_available(&mut self, hw: &mut impl HttpPort, name: &str) -> bool {
        self.state = UpdateState::CheckingVersion;
        self.checks += 1;
        let url = format!("{}{}.version", self.base_url, name);
        let response = match hw.get(&url, VERSION_BODY_LIMIT) {
            Ok(r) => r,
            Err(e) => {
                warn!("OTA: version check {} failed: {}", url, e);
                self.state = UpdateState::Idle;
                return false;
            }
        };
        if response.status != 200 {
            warn!("OTA: version check {} returned {}", url, response.status);
            self.state = UpdateState::Idle;
            return false;
        }
        let body = String::from_utf8_lossy(&response.body);
        let remote = body.lines().next().unwrap_or_default().trim();
        let newer = !remote.is_empty() && version::is_newer(remote, &self.local_version);
        info!(
            "OTA: remote version '{}', local '{}', newer: {}",
            remote, self.local_version, newer
        );
        if !newer {
            self.state = UpdateState::Idle;
        }
        newer
    }

    /// Download and install with the default progress report: feed the
    /// watchdog and broadcast `OK UPDATE:<name> <written>/<total>`.
    pub fn run<H: Platform>(&mut self, hw: &mut H, name: &str) -> Result<(), OtaError> {
        let label = name.to_string();
        self.run_with_progress(hw, name, move |hw: &mut H, written, total| {
            hw.feed();
            hw.broadcast(&format!("OK UPDATE:{} {}/{}", label, written, total));
        })
    }

    /// Download `<base><name>.bin` into the inactive slot, calling
    /// `progress(hw, written, total)` after every chunk.
    ///
    /// The terminal `ERR` line is broadcast here before returning the error.
    pub fn run_with_progress<H, F>(&mut self, hw: &mut H, name: &str, progress: F) -> Result<(), OtaError>
    where
        H: Platform,
        F: FnMut(&mut H, usize, usize),
    {
        self.started += 1;
        self.session = Some(UpdateSession::default());
        let result = self.install(hw, name, progress);
        hw.close_stream();

        match &result {
            Ok(()) => {
                self.state = UpdateState::Rebooting;
                self.session = None;
            }
            Err(e) => {
                self.state = UpdateState::Aborted;
                self.failures += 1;
                self.last_error = Some(e.to_string());
                if let Some(s) = self.session.as_mut() {
                    s.last_error = Some(e.clone());
                }
                warn!("OTA: {}", e);
                hw.broadcast(&format!("ERR UPDATE:{} {}", name, e));
                self.session = None;
                self.state = UpdateState::Idle;
            }
        }
        result
    }

    pub fn statistics(&self) -> Statistics {
        StatsBuilder::new()
            .add("updateChecks", self.checks)
            .add("updatesStarted", self.started)
            .add("updateFailures", self.failures)
            .add("lastUpdateError", self.last_error.as_deref().unwrap_or("-"))
            .build()
    }

    // ── Internal ──────────────────────────────────────────────

    fn install<H, F>(&mut self, hw: &mut H, name: &str, mut progress: F) -> Result<(), OtaError>
    where
        H: Platform,
        F: FnMut(&mut H, usize, usize),
    {
        self.state = UpdateState::Downloading;
        let url = format!("{}{}.bin", self.base_url, name);
        info!("OTA: downloading {}", url);
        let head = hw.open_stream(&url).map_err(OtaError::Download)?;
        if head.status != 200 {
            return Err(OtaError::BadStatus(head.status));
        }
        hw.broadcast(&format!("OK UPDATE:{} Starting", name));

        let size = match head.content_length {
            Some(n) if n > 0 => n,
            _ => return Err(OtaError::NoSize),
        };
        hw.begin_update(size).map_err(|e| match e {
            FlashError::NoSpace => OtaError::NotEnoughSpace,
            other => OtaError::Flash(other),
        })?;
        self.state = UpdateState::Writing;
        if let Some(s) = self.session.as_mut() {
            s.expected_size = size;
        }

        let written = match self.stream_into_flash(hw, size, &mut progress) {
            Ok(n) => n,
            Err(e) => {
                hw.abort_update();
                return Err(e);
            }
        };
        if written != size {
            hw.abort_update();
            return Err(OtaError::SizeMismatch { written, size });
        }

        hw.broadcast(&format!("OK UPDATE:{} Finishing", name));
        self.state = UpdateState::Finalizing;
        hw.finalize_update().map_err(|e| match e {
            FlashError::FinalizeFailed(code) => OtaError::FinalizeFailed(code),
            other => OtaError::Flash(other),
        })?;
        hw.broadcast(&format!("OK UPDATE:{} Finished", name));
        info!("OTA: {} bytes installed", written);
        Ok(())
    }

    /// Copy the body into flash until `size` bytes arrived or the stream ends.
    fn stream_into_flash<H, F>(&mut self, hw: &mut H, size: usize, progress: &mut F) -> Result<usize, OtaError>
    where
        H: Platform,
        F: FnMut(&mut H, usize, usize),
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut written = 0usize;
        while written < size {
            let want = (size - written).min(buf.len());
            let n = match hw.read_stream(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("OTA: stream read failed after {} bytes: {}", written, e);
                    break;
                }
            };
            hw.write_update(&buf[..n]).map_err(OtaError::Flash)?;
            written += n;
            if let Some(s) = self.session.as_mut() {
                s.bytes_written = written;
            }
            progress(hw, written, size);
        }
        Ok(written)
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running image valid so the bootloader does not roll it back.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA: rollback check (simulation): skipped");
}
