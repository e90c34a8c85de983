//! Reconnect policy
//!
//! Fixed-delay reconnection for sessions that have authenticated at least
//! once. A session that never authenticated is left idle until the operator
//! starts it again. Attempts are unbounded unless a cap is configured.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Bookkeeping for an in-progress reconnect cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttempt {
    /// Attempts scheduled since the last successful authentication
    pub attempt_count: u32,
    pub next_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
    /// Set once the session authenticates; reconnects are only made after that
    armed: bool,
    attempt: Option<ReconnectAttempt>,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            armed: false,
            attempt: None,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(Duration::from_millis(config.delay_ms)).with_max_attempts(config.max_attempts)
    }

    /// Cap the number of consecutive attempts (`None` retries forever)
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Current attempt record, if a reconnect cycle is in progress
    pub fn attempt(&self) -> Option<ReconnectAttempt> {
        self.attempt
    }

    /// The session authenticated: arm the policy and clear any attempt record
    pub fn on_connected(&mut self) {
        self.armed = true;
        self.attempt = None;
    }

    /// The transport dropped; returns the delay before the next attempt
    pub fn on_disconnect(&mut self) -> Option<Duration> {
        if !self.armed {
            return None;
        }

        let attempt_count = self.attempt.map_or(0, |a| a.attempt_count) + 1;
        if let Some(max) = self.max_attempts {
            if attempt_count > max {
                tracing::warn!(max_attempts = max, "Reconnect attempts exhausted");
                self.attempt = None;
                return None;
            }
        }

        self.attempt = Some(ReconnectAttempt {
            attempt_count,
            next_delay: self.delay,
        });
        Some(self.delay)
    }

    /// Drop any attempt record and disarm (used on shutdown)
    pub fn cancel(&mut self) {
        self.armed = false;
        self.attempt = None;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_reconnect_before_authentication() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(5));
        assert_eq!(policy.on_disconnect(), None);
        assert!(policy.attempt().is_none());
    }

    #[test]
    fn test_fixed_delay_unbounded() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(250));
        policy.on_connected();

        for expected in 1..=50 {
            assert_eq!(policy.on_disconnect(), Some(Duration::from_millis(250)));
            let attempt = policy.attempt().unwrap();
            assert_eq!(attempt.attempt_count, expected);
            assert_eq!(attempt.next_delay, Duration::from_millis(250));
        }
    }

    #[test]
    fn test_on_connected_resets_attempts() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1));
        policy.on_connected();
        policy.on_disconnect();
        policy.on_disconnect();
        assert_eq!(policy.attempt().unwrap().attempt_count, 2);

        policy.on_connected();
        assert!(policy.attempt().is_none());
        policy.on_disconnect();
        assert_eq!(policy.attempt().unwrap().attempt_count, 1);
    }

    #[test]
    fn test_max_attempts_cap() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1)).with_max_attempts(Some(2));
        policy.on_connected();
        assert!(policy.on_disconnect().is_some());
        assert!(policy.on_disconnect().is_some());
        assert_eq!(policy.on_disconnect(), None);
    }

    #[test]
    fn test_cancel_disarms() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1));
        policy.on_connected();
        policy.on_disconnect();
        policy.cancel();
        assert!(policy.attempt().is_none());
        assert_eq!(policy.on_disconnect(), None);
    }

    #[test]
    fn test_default_uses_config_delay() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(), Duration::from_secs(5));
    }
}
