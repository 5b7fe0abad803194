//! Informational callbacks about handshake progress.

use crate::{ErrorCategory, Interest, StateName};

/// Something the handshake wants an [`Observer`] to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The handshake left its initial state.
    HandshakeStart,
    /// Moved between states. Not reported when the state re-reads a
    /// message it handed over from the previous state.
    StateChange { from: StateName, to: StateName },
    /// A call into the client is returning something other than progress.
    Exit { state: StateName, outcome: Outcome },
    /// The handshake completed.
    HandshakeDone { resumed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    WouldBlock(Interest),
    Done,
    Failed(ErrorCategory),
}

/// Receives [`Event`]s. Must not block.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> Observer for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}
