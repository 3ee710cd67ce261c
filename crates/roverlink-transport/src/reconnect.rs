use std::time::{Duration, Instant};

/// Default minimum spacing between connection attempts on one channel.
pub const DEFAULT_RECONNECT_COOLDOWN: Duration = Duration::from_secs(10);

/// Cooldown gate for connection attempts.
///
/// The transport never reconnects on its own; an explicit request is turned
/// into an attempt only once `cooldown` has elapsed since the previous attempt
/// on that channel, successful or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub cooldown: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_RECONNECT_COOLDOWN,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    /// Returns true if an attempt may start at `now`.
    pub fn permits(&self, last_attempt: Option<Instant>, now: Instant) -> bool {
        match last_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
        }
    }

    /// Time left before the next attempt is allowed.
    pub fn remaining(&self, last_attempt: Option<Instant>, now: Instant) -> Duration {
        match last_attempt {
            None => Duration::ZERO,
            Some(last) => self
                .cooldown
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }
}
