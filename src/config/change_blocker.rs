// ABOUTME: Time windows during which rollout of new changes is blocked.
// ABOUTME: Blockers may apply to platform versions, revisions, or both.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::Deserialize;

use super::deserialize::{deserialize_hours, deserialize_weekdays};

/// Days and hours (UTC) covered by a window. Empty lists mean "all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TimeWindow {
    #[serde(default, deserialize_with = "deserialize_weekdays")]
    pub days: Vec<Weekday>,

    #[serde(default, deserialize_with = "deserialize_hours")]
    pub hours: Vec<u32>,
}

impl TimeWindow {
    pub fn includes(&self, at: DateTime<Utc>) -> bool {
        (self.days.is_empty() || self.days.contains(&at.weekday()))
            && (self.hours.is_empty() || self.hours.contains(&at.hour()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeBlocker {
    /// Blocks new application revisions.
    #[serde(default)]
    pub revision: bool,

    /// Blocks new platform versions.
    #[serde(default)]
    pub version: bool,

    #[serde(flatten)]
    pub window: TimeWindow,
}

impl ChangeBlocker {
    pub fn blocks_revisions(&self) -> bool {
        self.revision
    }

    pub fn blocks_versions(&self) -> bool {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_matches_day_and_hour() {
        let window = TimeWindow {
            days: vec![Weekday::Sat, Weekday::Sun],
            hours: vec![10, 11],
        };
        // 2026-10-17 is a Saturday.
        let inside = Utc.with_ymd_and_hms(2026, 10, 17, 10, 30, 0).unwrap();
        let wrong_hour = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        let wrong_day = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        assert!(window.includes(inside));
        assert!(!window.includes(wrong_hour));
        assert!(!window.includes(wrong_day));
    }

    #[test]
    fn empty_window_covers_everything() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap();
        assert!(TimeWindow::default().includes(at));
    }
}
