use std::time::Duration;

use crate::config::ConnectorConfig;

/// Reconnect backoff for one endpoint.
///
/// Each failed attempt waits the current cooldown, then grows it by 1.5×
/// up to `max_cooldown`. A successful reconnect resets everything.
#[derive(Clone, Debug)]
pub struct RestartState {
    pub endpoint: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub base_cooldown: Duration,
    pub max_cooldown: Duration,
    pub current_cooldown: Duration,
}

impl RestartState {
    pub fn new(endpoint: &str, max_attempts: u32, base_cooldown: Duration, max_cooldown: Duration) -> Self {
        RestartState {
            endpoint: endpoint.to_string(),
            attempts: 0,
            max_attempts,
            base_cooldown,
            max_cooldown,
            current_cooldown: base_cooldown,
        }
    }

    pub fn from_config(endpoint: &str, config: &ConnectorConfig) -> Self {
        Self::new(
            endpoint,
            config.reconnect_max_attempts,
            Duration::from_millis(config.reconnect_base_cooldown_ms),
            Duration::from_millis(config.reconnect_max_cooldown_ms),
        )
    }

    /// Record a failure; returns how long to wait before the next attempt.
    pub fn record_failed_attempt(&mut self) -> Duration {
        self.attempts += 1;
        let wait = self.current_cooldown;

        self.current_cooldown = Duration::from_secs_f64(
            (self.current_cooldown.as_secs_f64() * 1.5).min(self.max_cooldown.as_secs_f64()),
        );

        log::warn!(
            "[RESTART] {} attempt {} failed, next retry in {:.1}s",
            self.endpoint,
            self.attempts,
            wait.as_secs_f64()
        );
        wait
    }

    pub fn record_success(&mut self) {
        if self.attempts > 0 {
            log::info!(
                "[RESTART] {} reconnected after {} attempt(s)",
                self.endpoint,
                self.attempts
            );
        }
        self.attempts = 0;
        self.current_cooldown = self.base_cooldown;
    }

    /// Check if max attempts exceeded
    pub fn can_restart(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn status(&self) -> String {
        if self.attempts == 0 {
            return format!("{}: OK", self.endpoint);
        }
        if !self.can_restart() {
            return format!("{}: MAX_ATTEMPTS_EXCEEDED", self.endpoint);
        }
        format!(
            "{}: RECONNECTING (attempt {}/{}, cooldown {:.1}s)",
            self.endpoint,
            self.attempts,
            self.max_attempts,
            self.current_cooldown.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let mut state = RestartState::new("port", 5, Duration::from_secs(1), Duration::from_secs(30));

        let first = state.record_failed_attempt();
        assert_eq!(first, Duration::from_secs(1));
        let second = state.record_failed_attempt();
        assert!((second.as_secs_f64() - 1.5).abs() < 1e-9);
        let third = state.record_failed_attempt();
        assert!(third > second);
        assert_eq!(state.attempts, 3);
    }

    #[test]
    fn test_backoff_capped() {
        let mut state = RestartState::new("port", 100, Duration::from_secs(10), Duration::from_secs(12));
        for _ in 0..10 {
            state.record_failed_attempt();
        }
        assert_eq!(state.current_cooldown, Duration::from_secs(12));
    }

    #[test]
    fn test_max_attempts() {
        let mut state = RestartState::new("port", 2, Duration::from_millis(1), Duration::from_millis(5));
        assert!(state.can_restart());
        state.record_failed_attempt();
        assert!(state.can_restart());
        state.record_failed_attempt();
        assert!(!state.can_restart());
        assert_eq!(state.status(), "port: MAX_ATTEMPTS_EXCEEDED");
    }

    #[test]
    fn test_success_resets() {
        let mut state = RestartState::new("port", 3, Duration::from_secs(1), Duration::from_secs(30));
        state.record_failed_attempt();
        state.record_failed_attempt();
        state.record_success();
        assert_eq!(state.attempts, 0);
        assert_eq!(state.current_cooldown, Duration::from_secs(1));
        assert_eq!(state.status(), "port: OK");
    }
}
