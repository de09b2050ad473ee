use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::time::Duration;

/// When the remote store stops being attempted and when it is tried again
#[derive(Debug, Clone, PartialEq)]
pub struct HealthPolicy {
    /// Consecutive failures after which the remote is skipped
    pub error_threshold: u32,
    /// Time after the last failure before one attempt is let through
    pub recovery_window: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            error_threshold: 3,
            recovery_window: Duration::from_secs(60),
        }
    }
}

/// Tracks whether the remote store is worth attempting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionHealth {
    pub is_online: bool,
    pub consecutive_errors: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self {
            is_online: true,
            consecutive_errors: 0,
            last_success_at: None,
            last_failure_at: None,
        }
    }
}

impl ConnectionHealth {
    /// Online, and either under the error threshold or past the cool-down
    pub fn is_healthy_at(&self, policy: &HealthPolicy, now: DateTime<Utc>) -> bool {
        if !self.is_online {
            return false;
        }
        if self.consecutive_errors < policy.error_threshold {
            return true;
        }
        let window = ChronoDuration::from_std(policy.recovery_window)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));
        match self.last_failure_at {
            Some(failed_at) => now - failed_at >= window,
            None => true,
        }
    }

    pub fn is_healthy(&self, policy: &HealthPolicy) -> bool {
        self.is_healthy_at(policy, Utc::now())
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.consecutive_errors = 0;
        self.last_success_at = Some(now);
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.last_failure_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_makes_unhealthy() {
        let policy = HealthPolicy::default();
        let now = Utc::now();
        let mut health = ConnectionHealth::default();

        health.record_failure(now);
        health.record_failure(now);
        assert!(health.is_healthy_at(&policy, now));

        health.record_failure(now);
        assert!(!health.is_healthy_at(&policy, now));
    }

    #[test]
    fn test_cooldown_allows_retry() {
        let policy = HealthPolicy::default();
        let failed_at = Utc::now();
        let mut health = ConnectionHealth::default();
        for _ in 0..5 {
            health.record_failure(failed_at);
        }

        assert!(!health.is_healthy_at(&policy, failed_at + ChronoDuration::seconds(59)));
        assert!(health.is_healthy_at(&policy, failed_at + ChronoDuration::seconds(60)));
    }

    #[test]
    fn test_success_resets_errors() {
        let policy = HealthPolicy::default();
        let now = Utc::now();
        let mut health = ConnectionHealth::default();
        for _ in 0..3 {
            health.record_failure(now);
        }
        health.record_success(now);

        assert_eq!(health.consecutive_errors, 0);
        assert_eq!(health.last_success_at, Some(now));
        assert!(health.is_healthy_at(&policy, now));
    }

    #[test]
    fn test_offline_is_never_healthy() {
        let health = ConnectionHealth {
            is_online: false,
            ..ConnectionHealth::default()
        };
        assert!(!health.is_healthy(&HealthPolicy::default()));
    }
}
