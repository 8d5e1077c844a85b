//! Outcomes of command dispatch.
//!
//! Handlers only reply and set flags; anything that reboots the node is
//! handed back to the [`NodeService`](super::service::NodeService) as a
//! [`CommandAction`], which performs it after the reply has been sent.

/// Deferred side effect requested by a command handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// Nothing beyond the reply.
    None,
    /// Persist `reason` and restart.
    Reset { reason: &'static str },
    /// Invalidate the device record, persist `reason` and restart.
    Reconfigure { reason: &'static str },
}

/// What a handler produced for one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    /// Text unicast back to the sender.
    pub reply: Option<String>,
    pub action: CommandAction,
}

impl CommandReply {
    pub fn text(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            action: CommandAction::None,
        }
    }

    pub fn silent() -> Self {
        Self {
            reply: None,
            action: CommandAction::None,
        }
    }

    pub fn then(mut self, action: CommandAction) -> Self {
        self.action = action;
        self
    }
}
