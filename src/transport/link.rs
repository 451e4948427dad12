//! Link state shared by both transport endpoints.

/// Liveness classification of a single transport endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No socket exists; the endpoint is stopped.
    #[default]
    Down,

    /// The socket is connected but no reply has been seen yet.
    Trying,

    /// At least one message has been received.
    Up,

    /// The liveness budget was exhausted while the link was up.
    Timeout,

    /// A transport error occurred; terminal until the next ready cycle.
    Error,
}

impl LinkState {
    /// Returns `true` if the link has seen traffic and is considered live.
    #[must_use]
    pub fn is_up(self) -> bool {
        matches!(self, Self::Up)
    }

    /// Returns `true` if a socket exists for this link.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Trying | Self::Up | Self::Timeout)
    }

    /// Returns `true` if the heartbeat timer may be armed in this state.
    #[must_use]
    pub fn allows_heartbeat(self) -> bool {
        matches!(self, Self::Trying | Self::Up)
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Down => write!(f, "down"),
            Self::Trying => write!(f, "trying"),
            Self::Up => write!(f, "up"),
            Self::Timeout => write!(f, "timeout"),
            Self::Error => write!(f, "error"),
        }
    }
}
