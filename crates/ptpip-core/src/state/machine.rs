//! Connection state of a PTP/IP session.

use std::fmt;

/// Lifecycle of a session, in handshake order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection attempted yet.
    #[default]
    Disconnected,
    /// Opening the command connection.
    CommandConnecting,
    /// Command connection acknowledged by the responder.
    CommandOpen,
    /// Opening the event connection.
    EventConnecting,
    /// Both connections up; operations may be issued.
    Ready,
    /// Both connections torn down.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "DISCONNECTED"),
            SessionState::CommandConnecting => write!(f, "COMMAND_CONNECTING"),
            SessionState::CommandOpen => write!(f, "COMMAND_OPEN"),
            SessionState::EventConnecting => write!(f, "EVENT_CONNECTING"),
            SessionState::Ready => write!(f, "READY"),
            SessionState::Closed => write!(f, "CLOSED"),
        }
    }
}

impl SessionState {
    /// Check if operations may be issued.
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready)
    }

    /// Check if the handshake is still in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            SessionState::CommandConnecting
                | SessionState::CommandOpen
                | SessionState::EventConnecting
        )
    }

    /// Move to `next`, logging the transition.
    pub fn goto(&mut self, next: SessionState) {
        tracing::debug!(from = %self, to = %next, "Session state transition");
        *self = next;
    }
}
