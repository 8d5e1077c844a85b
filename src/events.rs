//! Callback-driven event plumbing.
//!
//! Events are produced by:
//! - Network-stack callbacks on the system event loop task (link up/down,
//!   address assigned/lost)
//! - Command handlers (firmware update requested)
//!
//! Events are consumed by the main loop, one at a time, in FIFO order.
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ WiFi callback    │────▶│  LINK_EVENTS │────▶│  Main Loop   │
//! │ IP callback      │────▶│  (bounded)   │     │  (consumer)  │
//! └──────────────────┘     └──────────────┘     └──────────────┘
//!
//! ┌──────────────────┐     ┌──────────────┐
//! │ UPDATE handler   │────▶│  UpdateFlag  │────▶ next connectivity poll
//! └──────────────────┘     └──────────────┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// Channel depth for link events.  Bursts beyond this are dropped; the
/// connectivity poll also reads the live link state, so nothing is lost.
const LINK_EVENT_DEPTH: usize = 8;

/// Link-layer notifications from the network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Station associated with the access point.
    Up,
    /// Station lost the association.
    Down,
    /// An address was assigned (DHCP or static).
    GotAddress,
    /// The address was released.
    LostAddress,
}

impl LinkEvent {
    /// Whether this event means the node can now talk on the network.
    pub fn is_online(self) -> bool {
        matches!(self, Self::GotAddress)
    }

    /// Whether this event means connectivity is gone.
    pub fn is_offline(self) -> bool {
        matches!(self, Self::Down | Self::LostAddress)
    }
}

/// Network callbacks → main loop.
pub static LINK_EVENTS: Channel<CriticalSectionRawMutex, LinkEvent, LINK_EVENT_DEPTH> =
    Channel::new();

/// Push a link event.  Safe to call from the event-loop task.
/// Returns `false` if the queue is full (event dropped).
pub fn push_link_event(event: LinkEvent) -> bool {
    LINK_EVENTS.try_send(event).is_ok()
}

/// Pop the next link event.  Returns `None` if the queue is empty.
pub fn pop_link_event() -> Option<LinkEvent> {
    LINK_EVENTS.try_receive().ok()
}

// ── Update request flag ───────────────────────────────────────

/// Single pending "check for firmware" request.
///
/// Set by the `UPDATE` command handler, consumed by the next connectivity
/// poll.  Repeated requests before consumption collapse into one.
#[derive(Debug, Clone, Default)]
pub struct UpdateFlag(Arc<AtomicBool>);

impl UpdateFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an update check as pending.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume the pending request.  Returns `true` at most once per request.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
