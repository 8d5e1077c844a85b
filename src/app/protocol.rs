//! Single-token command protocol on the local multicast group.
//!
//! ```text
//!  Idle ──listen()──▶ Listening   (for the rest of the process lifetime)
//! ```
//!
//! A datagram shorter than 10 bytes is a command token, matched verbatim
//! (case-sensitive, no trimming).  Longer datagrams and unknown tokens are
//! dropped without a reply.  Handlers never block beyond writing their
//! reply: `UPDATE` only raises the [`UpdateFlag`], and `RESET`/`RECONF`
//! return a [`CommandAction`] that the caller executes after replying.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use log::{debug, info};

use crate::diagnostics::{Statistics, StatsBuilder};
use crate::events::UpdateFlag;

use super::commands::{CommandAction, CommandReply};
use super::ports::{ChannelError, CommandChannelPort};

/// Longest accepted token.
pub const MAX_COMMAND_LEN: usize = 9;

pub const REASON_RESET: &str = "remote reset request";
pub const REASON_RECONF: &str = "remote reconfigure request";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Idle,
    Listening,
}

/// Snapshot of node identity and diagnostics used to build replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub version: &'static str,
    pub reset_reason: String,
    pub uptime_ms: u64,
    pub reset_causes: [&'static str; 2],
    pub local_ip: Ipv4Addr,
    pub mac: String,
    /// Pre-rendered `<component>.<key>:<value>` lines.
    pub statistics: String,
}

/// Custom handler registered through [`CommandProtocol::register`].
pub type CommandHandler = Box<dyn FnMut(&NodeInfo) -> CommandReply>;

enum Handler {
    Update,
    Reset,
    Reconfigure,
    Info,
    Version,
    Custom(CommandHandler),
}

pub struct CommandProtocol {
    state: ProtocolState,
    handlers: HashMap<String, Handler>,
    update_flag: UpdateFlag,
    received: u32,
    ignored: u32,
}

impl CommandProtocol {
    pub fn new(update_flag: UpdateFlag) -> Self {
        let mut handlers = HashMap::new();
        handlers.insert("UPDATE".to_string(), Handler::Update);
        handlers.insert("RESET".to_string(), Handler::Reset);
        handlers.insert("RECONF".to_string(), Handler::Reconfigure);
        handlers.insert("INFO".to_string(), Handler::Info);
        handlers.insert("VERSION".to_string(), Handler::Version);
        Self {
            state: ProtocolState::Idle,
            handlers,
            update_flag,
            received: 0,
            ignored: 0,
        }
    }

    /// Add (or replace) a token.  Tokens that could never be received are
    /// rejected and `false` is returned.
    pub fn register(&mut self, token: &str, handler: CommandHandler) -> bool {
        if token.is_empty() || token.len() > MAX_COMMAND_LEN {
            return false;
        }
        self.handlers.insert(token.to_string(), Handler::Custom(handler));
        true
    }

    /// Join the command group.  Idempotent once listening.
    pub fn listen(
        &mut self,
        hw: &mut impl CommandChannelPort,
        group: Ipv4Addr,
        port: u16,
    ) -> Result<(), ChannelError> {
        if self.state == ProtocolState::Listening {
            return Ok(());
        }
        hw.listen(group, port)?;
        self.state = ProtocolState::Listening;
        info!("Protocol: listening on {}:{}", group, port);
        Ok(())
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Extract the token of a datagram, or `None` if it is too long or not UTF-8.
    pub fn parse(payload: &[u8]) -> Option<&str> {
        if payload.len() > MAX_COMMAND_LEN {
            return None;
        }
        core::str::from_utf8(payload).ok()
    }

    /// Count the datagram and return its token if a handler is registered for it.
    pub fn accept(&mut self, payload: &[u8]) -> Option<String> {
        self.received += 1;
        match Self::parse(payload) {
            Some(token) if self.handlers.contains_key(token) => Some(token.to_string()),
            _ => {
                self.ignored += 1;
                debug!("Protocol: ignored {}-byte datagram", payload.len());
                None
            }
        }
    }

    /// Run the handler for an accepted token.
    pub fn dispatch(&mut self, token: &str, info: &NodeInfo) -> Option<CommandReply> {
        let handler = self.handlers.get_mut(token)?;
        info!("Protocol: {} called", token);
        let reply = match handler {
            Handler::Update => {
                self.update_flag.request();
                CommandReply::text(format!("OK UPDATE:{}", info.name))
            }
            Handler::Reset => CommandReply::text(format!("OK RESET:{}", info.name))
                .then(CommandAction::Reset {
                    reason: REASON_RESET,
                }),
            Handler::Reconfigure => CommandReply::text(format!("OK RECONF:{}", info.name))
                .then(CommandAction::Reconfigure {
                    reason: REASON_RECONF,
                }),
            Handler::Info => CommandReply::text(info_report(info)),
            Handler::Version => CommandReply::text(version_report(info)),
            Handler::Custom(f) => f(info),
        };
        Some(reply)
    }

    /// [`accept`](Self::accept) then [`dispatch`](Self::dispatch).
    pub fn handle_datagram(&mut self, payload: &[u8], info: &NodeInfo) -> Option<CommandReply> {
        let token = self.accept(payload)?;
        self.dispatch(&token, info)
    }

    pub fn statistics(&self) -> Statistics {
        StatsBuilder::new()
            .add("commandsReceived", self.received)
            .add("commandsIgnored", self.ignored)
            .build()
    }
}

/// `OK VERSION:<name>\nVersion:<semver>`
pub fn version_report(info: &NodeInfo) -> String {
    format!("OK VERSION:{}\nVersion:{}", info.name, info.version)
}

/// Multi-line `INFO` reply followed by the statistics block.
pub fn info_report(info: &NodeInfo) -> String {
    format!(
        "OK INFO:{}\nVersion:{}\nResetReason:{}\nRunTimeInMillis:{}\nResetSource:{}:{}\nLocalIP:{}\nMac:{}\n{}",
        info.name,
        info.version,
        info.reset_reason,
        info.uptime_ms,
        info.reset_causes[0],
        info.reset_causes[1],
        info.local_ip,
        info.mac,
        info.statistics,
    )
}
