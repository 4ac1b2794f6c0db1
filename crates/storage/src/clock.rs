use chrono::{DateTime, Duration, Utc};

/// Idle-expiry policy: an entry is eligible for sweeping once it has
/// not been touched for `ttl`. The clock itself never removes anything,
/// it only answers the question.
#[derive(Clone, Copy)]
pub struct IdleClock {
    ttl: Duration,
}

impl IdleClock {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn hours(hours: i64) -> Self {
        Self::new(Duration::hours(hours))
    }

    pub fn days(days: i64) -> Self {
        Self::new(Duration::days(days))
    }

    pub fn expired(&self, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last_activity > self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_ttl() {
        let clock = IdleClock::hours(24);
        let now = Utc::now();

        assert!(!clock.expired(now - Duration::hours(23), now));
        assert!(clock.expired(now - Duration::hours(25), now));
    }

    #[test]
    fn boundary_is_exclusive() {
        let clock = IdleClock::hours(1);
        let now = Utc::now();

        assert!(!clock.expired(now - Duration::hours(1), now));
    }
}
