// ABOUTME: Source of the current time for the orchestration engine.
// ABOUTME: The system clock in production, a manually advanced clock in tests and simulations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock which only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// A clock fixed at an RFC 3339 instant, e.g. `2024-03-04T12:00:00Z`.
    pub fn at(rfc3339: &str) -> Result<Self, chrono::ParseError> {
        let now = DateTime::parse_from_rfc3339(rfc3339)?.with_timezone(&Utc);
        Ok(Self::new(now))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        if let Some(later) = chrono::Duration::from_std(by)
            .ok()
            .and_then(|by| now.checked_add_signed(by))
        {
            *now = later;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::at("2024-03-04T12:00:00Z").unwrap();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(90));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn rejects_malformed_instants() {
        assert!(ManualClock::at("yesterday").is_err());
    }
}
